//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "gRPC surface of the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
fn main() {
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("failed to locate protoc");
    std::env::set_var("PROTOC", protoc);

    println!("cargo:rerun-if-changed=proto/test_agent.proto");
    println!("cargo:rerun-if-changed=proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/test_agent.proto"], &["proto"])
        .expect("failed to compile gRPC definitions");
}
