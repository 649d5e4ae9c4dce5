fn main() {
    if let Err(err) = form_bridge::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
