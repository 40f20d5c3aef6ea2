use std::net::TcpListener;

#[tokio::test]
async fn test_exporter_installs_once() {
    let taken = TcpListener::bind(("0.0.0.0", 0)).unwrap();
    let port = taken.local_addr().unwrap().port();
    let err = withdrawer::install_prometheus_exporter(port).unwrap_err();
    assert!(err.to_string().contains(&port.to_string()));

    withdrawer::install_prometheus_exporter(0).unwrap();
    // The global recorder is already set.
    assert!(withdrawer::install_prometheus_exporter(0).is_err());
}
