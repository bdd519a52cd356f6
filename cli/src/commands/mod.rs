pub mod check;
pub mod inspect;
