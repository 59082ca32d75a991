#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{
        use std::io::Write;
        use std::env;

        if let Ok(trace_file) = env::var("DBTUNE_TRACE") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(trace_file)
                .expect("Can't create trace file - check DBTUNE_TRACE variable");

            writeln!(file, "[{}:{}] {}", file!(), line!(), format_args!($($arg)*))
                .expect("Unable to write to trace file");
        }
    }};
}
