//! Page logic of the console.
//!
//! Every page follows the same shape: `load` fetches the rows the signed-in identity
//! may see (newest first), and each action writes through the data service before
//! touching the loaded state. A failed action returns the error and leaves the page
//! exactly as it was; a successful one merges locally (delete removes the row,
//! toggle flips the flag) or reloads (create and update).

pub mod acls;
pub mod dashboard;
pub mod logs;
pub mod nodes;
pub mod preauth_keys;
pub mod profile;
pub mod routes;
pub mod settings;
pub mod users;
