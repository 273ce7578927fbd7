pub mod notifier;

pub use notifier::{EventKind, NotificationEvent, NotificationResult, NotifierPlugin};
