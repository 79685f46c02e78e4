//! Router Module Index
//!
//! Splits the console's endpoints by the access they require. Access control is
//! attached per module in `create_router`.

/// Routes reachable without a session: health, session state, sign-in and sign-out.
pub mod public;

/// Routes behind the `Viewer` extractor middleware. Require a signed-in identity.
pub mod authenticated;

/// Routes additionally gated by the navigation guard (admin role).
pub mod admin;
