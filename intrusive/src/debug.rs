/// Per-operation tracing of reference count traffic. Far too noisy for the
/// `log` facade, so it only exists when the crate is built with
/// `extra_verbose_debug_logging`.
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        #[cfg(feature = "extra_verbose_debug_logging")]
        println!("{:?}: {}", std::thread::current().id(), format!($($arg)*));
    };
}
