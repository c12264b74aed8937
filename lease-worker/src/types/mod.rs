pub mod ids;
pub mod task;
pub mod message;
pub mod outcome;
pub mod priority;
pub mod events;

pub use ids::{TaskId, MessageId, Receipt};
pub use task::{Task, PayloadSource, normalize_task_type};
pub use message::QueueMessage;
pub use outcome::{ProcessingOutcome, OutcomeStatus, UndecodableMessage};
pub use priority::Priority;
pub use events::{TaskEvent, Alert, AlertSeverity};
