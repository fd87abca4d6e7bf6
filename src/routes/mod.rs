/// Router Module Index
///
/// Routes are split by access level so the auth layer is applied to a whole router at
/// once instead of per handler.

/// Routes open to anonymous callers: health, registration and login.
pub mod public;

/// Routes behind the bearer-token middleware.
pub mod authenticated;
