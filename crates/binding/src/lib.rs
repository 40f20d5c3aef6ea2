//! Contract bindings for the external contracts the bridge talks to.
//!
//! Only the ERC20 token interface is needed: payouts are plain `transfer`
//! calls and confirmation inspects the `Transfer` events they emit.
//!
//! All bindings are generated using alloy's `sol!` macro.

pub mod token;

pub use token::IERC20;
