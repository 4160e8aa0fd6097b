//! Chat client for the relay
mod controller;
mod debounce;
mod relay;
mod session;

pub use controller::{ChatController, ChatView, TerminalView};
pub use debounce::{DEFAULT_DEBOUNCE, debounce};
pub use relay::{Relay, RelayClient, TextStream, Utf8Decoder};
pub use session::{ChatSession, Phase};
