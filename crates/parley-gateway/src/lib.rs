pub mod longpoll;
pub mod notifier;
