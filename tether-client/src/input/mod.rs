mod input_dispatcher;
mod input_sender;
mod viewport;

pub use input_dispatcher::{Dispatched, InputDispatcher, RemoteInputCapability};
pub use input_sender::{InputPath, InputRelay, InputSender};
pub use viewport::Viewport;
