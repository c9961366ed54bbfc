//! Terminal front-end for the ARS team chat channel.
//!
//! The `ars-chat` binary wires the production [`ars_client`] services to a
//! [`TerminalView`] and feeds stdin lines through [`input::parse`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod input;
pub mod view;

pub use input::Input;
pub use view::TerminalView;
