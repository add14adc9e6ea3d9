pub mod dispatch;
pub mod notifications;
pub mod notifier;
pub mod presence;
