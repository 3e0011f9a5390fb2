fn main() {
    // Host builds (`--no-default-features`) have no ESP-IDF toolchain to
    // export, so the embuild step only runs when the feature pulls it in.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
