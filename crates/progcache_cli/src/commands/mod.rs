pub mod inspect;
pub mod verify;
pub mod warmup;
