use std::sync::Mutex;

use tempfile::NamedTempFile;

use tx_vision::config::ClientConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "TXVISION_CONFIG",
        "TXVISION_TABLE_SERVER",
        "TXVISION_TOPIC_PREFIX",
        "TXVISION_LEFT_CAMERA",
        "TXVISION_RIGHT_CAMERA",
        "TXVISION_STREAM_ADDR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [table]
        server = "10.55.49.2:1883"
        topic_prefix = "Vision"

        [cameras]
        left = "usb-linux"
        right = "usb-index"
        width = 320
        height = 240

        [pipeline]
        hue = [30, 60]
        distance_constant = 14.0

        [stream]
        addr = "0.0.0.0:8091"
        quality = 60
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("TXVISION_CONFIG", file.path());
    std::env::set_var("TXVISION_TOPIC_PREFIX", "Dashboard");
    std::env::set_var("TXVISION_RIGHT_CAMERA", "stub://empty");

    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.table.server, "10.55.49.2:1883");
    // Env wins over the file.
    assert_eq!(cfg.table.topic_prefix, "Dashboard");
    assert_eq!(cfg.right_camera, "stub://empty");
    // Platform aliases expand on the way in.
    assert_eq!(cfg.left_camera, "/dev/video1");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.params.hsv.hue, (30, 60));
    assert_eq!(cfg.params.distance_constant, 14.0);
    assert_eq!(cfg.stream.quality, 60);

    clear_env();
}

#[test]
fn missing_env_boots_with_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ClientConfig::load().expect("defaults");
    assert_eq!(cfg.table.server, "127.0.0.1:1883");
    assert_eq!(cfg.table.topic_prefix, "SmartDashboard");
    assert_eq!(cfg.left_camera, "stub://target");
    assert_eq!(cfg.params.resize_width, 280);
}

#[test]
fn bad_toml_is_an_error_not_a_panic() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"[table\nserver=").expect("write config");
    std::env::set_var("TXVISION_CONFIG", file.path());

    assert!(ClientConfig::load().is_err());
    clear_env();
}
