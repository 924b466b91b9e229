/// `&'static Regex` for a literal pattern, compiled on first use.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).expect(concat!("invalid regex literal: ", $pat)));
        &*RE
    }};
}
