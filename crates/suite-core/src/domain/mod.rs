pub mod error;
pub mod package;

pub use error::{PublishError, ResolveError, Result, SuiteError};
pub use package::{PackageNode, StepStatus};
