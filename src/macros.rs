// Hex/char dump used at trace level when logging wire buffers, built so
// call sites can interpolate it straight into a `log::trace!`/`log::debug!`
// format string instead of writing to stderr.
#[macro_export]
macro_rules! format_buffer {
    ("X", $buf:expr) => {{
        let mut s = String::new();
        for b in $buf.iter() {
            s.push_str(&format!("{:02X} ", b));
        }
        s
    }};

    ("C", $buf:expr) => {{
        let mut s = String::new();
        for b in $buf.iter() {
            if b.is_ascii_graphic() {
                s.push(*b as char);
            } else {
                s.push('.');
            }
        }
        s
    }};
}
