//! Long-lived pump tasks draining the byte and command queues.

mod command;
mod receiver;
mod transmitter;

pub use command::command_pump;
pub use receiver::receiver_pump;
pub use transmitter::transmitter_pump;
