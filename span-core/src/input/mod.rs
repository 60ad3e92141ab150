//! Agent-side input injection.
//!
//! | Module       | Purpose                                            |
//! |--------------|----------------------------------------------------|
//! | `keymap`     | Named-key table, key/text resolution               |
//! | `backend`    | `InputBackend` seam, `SendInput` and stub backends |
//! | `dispatcher` | Remaps and executes commands, one at a time        |
//! | `service`    | Poll-drain-dispatch loop                           |

pub mod backend;
pub mod dispatcher;
pub mod keymap;
pub mod service;

pub use backend::{DisplaySize, InputBackend, SendInputBackend, UnavailableBackend};
pub use dispatcher::{
    CommandDispatcher, DispatchOutcome, DispatchReport, remap, wheel_notches,
};
pub use keymap::{Key, KeyTarget};
pub use service::{CommandService, CommandServiceConfig};
