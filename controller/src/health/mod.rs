//! Device health derivation

pub mod fsm;
