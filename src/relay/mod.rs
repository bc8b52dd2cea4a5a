pub mod exchange;
pub mod guard;
pub mod orders;

pub use exchange::{Downstream, TokenExchangeRelay};
pub use guard::{bearer_token, require_scopes, AccessGuard};
pub use orders::{Checkout, Order, OrderBook, OrderItem, OrderStatus, Product};
