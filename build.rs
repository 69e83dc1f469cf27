// https://docs.rs/tonic-build/latest/tonic_build/
fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let proto_files = &["protocols/datatransfer.proto"];

    tonic_build::configure()
        .build_server(false)
        .build_client(false)
        .compile(proto_files, &["protocols"])?;
    Ok(())
}
