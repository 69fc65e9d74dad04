use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A handy shortcut to replace the `RwLock` write()/read().unwrap() pattern
/// with `wl` and `rl`.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}

pub fn init_log() {
    use env_logger::Builder;
    use std::io::Write;

    let mut builder = Builder::from_default_env();
    let _ = builder
        .format_timestamp_secs()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} - {}] [{}:{}] {}",
                record.level(),
                record.target(),
                record.file().unwrap_or("?"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
}
