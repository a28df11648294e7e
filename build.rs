fn main() {
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let mut res = winresource::WindowsResource::new();
    res.set("ProductName", "Window Switcher");
    res.set("FileDescription", "Window Switcher hotkey backend");
    if let Err(e) = res.compile() {
        println!("cargo:warning=failed to embed version resources: {e}");
    }
}
