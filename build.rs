fn main() {
    // Exposes git/build metadata to the crate as `built_info`.
    if let Err(err) = built::write_built_file() {
        panic!("Failed to acquire build-time information: {err}");
    }
}
