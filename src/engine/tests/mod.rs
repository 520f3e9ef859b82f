pub mod helpers;
mod tests_close;
mod tests_prefix;
