pub mod grade;
pub mod job;
pub mod loaders;
pub mod question;
pub mod submission;

pub use grade::{GradeRow, GradingResult};
pub use job::{AssignmentSpec, GradingJob, SubmissionSpec};
pub use loaders::{load_all_job_files, load_job_file};
pub use question::{
    sum_points, AnswerMap, DocumentKind, DocumentTree, QuestionNode, RubricEntry, MAX_NODE_POINTS,
};
pub use submission::{AssignmentRecord, SubmissionRecord, SubmissionStatus};
