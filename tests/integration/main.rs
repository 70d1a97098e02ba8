#![allow(clippy::module_name_repetitions)]
#![forbid(non_ascii_idents, unsafe_code)]

/// Runs the provided `async` block inside a [`tokio::task::LocalSet`].
macro_rules! local {
    ($body:expr) => {
        tokio::task::LocalSet::new().run_until($body).await
    };
}

mod fakes;
mod producing;
mod reconciliation;
mod subscription;
