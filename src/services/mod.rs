pub mod bot;
pub mod events;
pub mod init;
pub mod reports;
pub mod sweeps;
pub mod telegram;
