//! Standard-library bindings for the Asteria execution core.
//!
//! Every member here is a plain native function following the binding
//! convention: it receives a mutable self reference, the argument vector
//! (self appended last) and the global context, and returns by mutating
//! self. `create_bindings` mounts the whole tree under the global `std`
//! object.

pub mod argread;
pub mod checksum;

pub use argread::ArgumentReader;

use asteria_runtime::{GlobalContext, RuntimeError};

/// Mount the standard-library members into `std`.
pub fn create_bindings(global: &mut GlobalContext) -> Result<(), RuntimeError> {
    global.set_std_member("checksum", checksum::create_bindings_checksum())?;
    Ok(())
}
