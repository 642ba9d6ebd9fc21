pub mod control;
pub mod dispatch;
pub mod error;
pub mod keyboard;
pub mod model;
pub mod pause;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod timing;
pub mod typo;
