pub mod event;
pub mod notification_log;
pub mod studio;

pub use event::EventRepository;
pub use notification_log::NotificationLogRepository;
pub use studio::StudioRepository;
