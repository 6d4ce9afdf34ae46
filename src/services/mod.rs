pub mod document_parser;
pub mod grading_oracle;
pub mod markup;
pub mod reconciler;
pub mod segmenter;

pub use document_parser::{DocumentParsingService, HeuristicParser, OracleParser, ParseStrategy};
pub use grading_oracle::GradingOracleAdapter;
pub use reconciler::IdentifierReconciler;
pub use segmenter::DocumentSegmenter;
