//! Opt-in dump of intermediate key material, for checking interop against
//! other implementations. Enabled with `ECE_KEYLOG=1`, read once.

use std::sync::OnceLock;

use crate::base64url;

static ENABLED: OnceLock<bool> = OnceLock::new();

#[cfg(test)]
thread_local! {
    static FORCED: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

pub(crate) fn enabled() -> bool {
    #[cfg(test)]
    if FORCED.with(std::cell::Cell::get) {
        return true;
    }
    *ENABLED.get_or_init(|| std::env::var("ECE_KEYLOG").is_ok_and(|v| v == "1"))
}

pub(crate) fn keylog(label: &str, value: &[u8]) {
    if enabled() {
        tracing::debug!(
            target: "ecekit::keylog",
            len = value.len(),
            value = %base64url::encode(value),
            "{label}"
        );
    }
}

/// Runs `f` with the key log on for this thread and returns the lines it
/// emitted.
#[cfg(test)]
pub(crate) fn capture(f: impl FnOnce()) -> Vec<String> {
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&buf);
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || Sink(Arc::clone(&writer)))
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .finish();

    FORCED.with(|forced| forced.set(true));
    tracing::subscriber::with_default(subscriber, f);
    FORCED.with(|forced| forced.set(false));

    let out = String::from_utf8_lossy(&buf.lock()).into_owned();
    out.lines().map(str::to_string).collect()
}
