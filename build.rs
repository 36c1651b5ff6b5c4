//! Collect build information for the metadata written alongside results
fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");
}
