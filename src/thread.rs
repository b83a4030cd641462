use std::io;
use std::thread::{self, JoinHandle};

/// spawn `name`d thread performs `f`
pub fn spawn_thread<N, F, R>(name: N, f: F) -> io::Result<JoinHandle<R>>
where
    N: Into<String>,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(f)
}
