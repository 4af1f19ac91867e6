/// Router Module Index
///
/// Routes are grouped by the access layer they sit behind. `lib.rs` merges the three
/// groups and wraps the authenticated and admin groups in `auth_middleware`; each
/// route that needs more than a valid session also carries its `authorize` policy.

/// Routes reachable without a token.
pub mod public;

/// Routes behind authentication, each gated by its own policy where needed.
pub mod authenticated;

/// Routes for the `admin` role only.
pub mod admin;
