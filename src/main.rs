use anyhow::Result;
use auto_grader::utils::logging;
use auto_grader::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let stats = App::initialize(config).await?.run().await?;
    if stats.failed > 0 {
        tracing::warn!("⚠️ 有 {} 份提交评分失败，请查看日志", stats.failed);
    }

    Ok(())
}
