//! Driven-side adapters: everything that implements a port trait against
//! a real resource. The control core never imports from here.

pub mod clock;
pub mod console;
pub mod hardware;
