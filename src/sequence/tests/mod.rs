#[cfg(feature = "paged")]
mod paged;
