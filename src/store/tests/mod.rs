mod tests_meta;
