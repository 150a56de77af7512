fn main() {
    dealpulse_lib::run()
}
