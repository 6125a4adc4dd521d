pub mod ipopt;
pub mod juniper;
