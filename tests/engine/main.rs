#[path = "../common/mod.rs"]
mod common;

mod changes;
mod concurrency;
mod drop_ident;
mod lifecycle;
mod recovery;
