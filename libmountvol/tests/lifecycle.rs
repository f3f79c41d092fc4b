//! End-to-end lifecycle tests against a recording fake of the host.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use libmountvol::{
    CreateRequest, DriverConfig, MountRequest, MountSystem, MountedVolumeDriver, PluginServer,
    Scope, StatusValue, VolumeCallback, VolumeError,
};
use nix::errno::Errno;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

struct BlockDevice;

#[async_trait]
impl VolumeCallback for BlockDevice {
    fn validate(&self, req: &CreateRequest) -> Result<(), VolumeError> {
        match req.option("device") {
            Some(_) => Ok(()),
            None => Err(VolumeError::InvalidArgument(
                "device is required in driver_opts".into(),
            )),
        }
    }

    fn mount_options(&self, req: &CreateRequest) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(fstype) = req.option("type") {
            args.push("-t".to_owned());
            args.push(fstype.to_owned());
        }
        args.push(req.option("device").unwrap_or_default().to_owned());
        args
    }
}

/// Records every mount invocation and the peak number running at once.
#[derive(Default)]
struct RecordingSystem {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    mounted: Mutex<Vec<PathBuf>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Option<Duration>,
}

#[async_trait]
impl MountSystem for RecordingSystem {
    async fn run_mount(&self, program: &str, args: &[String]) -> Result<(), VolumeError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((program.to_owned(), args.to_vec()));
        self.mounted
            .lock()
            .unwrap()
            .push(PathBuf::from(args.last().unwrap()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn unmount(&self, path: &Path) -> nix::Result<()> {
        let mut mounted = self.mounted.lock().unwrap();
        let before = mounted.len();
        mounted.retain(|p| p != path);
        if mounted.len() == before {
            return Err(Errno::EINVAL);
        }
        Ok(())
    }

    async fn is_mounted(&self, path: &Path) -> bool {
        self.mounted.lock().unwrap().iter().any(|p| p == path)
    }
}

fn driver(
    dir: &Path,
    system: Arc<RecordingSystem>,
) -> Arc<MountedVolumeDriver<BlockDevice>> {
    let config = DriverConfig::new("blockdev", "mount", true, Scope::Local)
        .with_state_dir(dir.join("state"))
        .with_mount_root(dir.join("mnt"));
    Arc::new(
        MountedVolumeDriver::open(config, BlockDevice)
            .unwrap()
            .with_system(system),
    )
}

#[tokio::test]
async fn create_mount_unmount_remove() {
    let tmp = tempfile::tempdir().unwrap();
    let system = Arc::new(RecordingSystem::default());
    let driver = driver(tmp.path(), system.clone());

    let create = CreateRequest::new("vol1").with_option("device", "/dev/sdb1");
    driver.create(&create).await.unwrap();

    let info = driver.get("vol1").await.unwrap();
    assert_eq!(info.options, create.options);
    assert!(!info.status.mounted);

    let req = MountRequest::new("vol1", "abc");
    let mount_point = driver.mount(&req).await.unwrap();
    assert_eq!(
        mount_point,
        tmp.path().join("mnt").join("abc").display().to_string()
    );

    {
        let calls = system.calls.lock().unwrap();
        let (program, args) = &calls[0];
        assert_eq!(program, "mount");
        assert!(args.contains(&"/dev/sdb1".to_owned()));
        assert_eq!(args.last(), Some(&mount_point));
    }

    let info = driver.get("vol1").await.unwrap();
    assert!(info.status.mounted);
    assert_eq!(info.mountpoint, mount_point);
    assert_eq!(driver.path("vol1").await.unwrap(), mount_point);

    driver.unmount(&req).await.unwrap();
    assert!(!Path::new(&mount_point).exists());
    assert_eq!(driver.path("vol1").await.unwrap(), "");
    assert!(!driver.get("vol1").await.unwrap().status.mounted);

    driver.remove("vol1").await.unwrap();
    assert!(driver.get("vol1").await.unwrap_err().is_not_found());
    assert!(driver.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn records_survive_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let system = Arc::new(RecordingSystem::default());
    let mount_point = {
        let driver = driver(tmp.path(), system.clone());
        driver
            .create(&CreateRequest::new("vol1").with_option("device", "/dev/sdb1"))
            .await
            .unwrap();
        driver
            .create(&CreateRequest::new("vol2").with_option("device", "/dev/sdc1"))
            .await
            .unwrap();
        driver
            .mount(&MountRequest::new("vol1", "abc"))
            .await
            .unwrap()
    };

    let driver = driver(tmp.path(), system);
    let mut names: Vec<_> = driver
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.name)
        .collect();
    names.sort();
    assert_eq!(names, ["vol1", "vol2"]);
    assert_eq!(driver.path("vol1").await.unwrap(), mount_point);
}

#[tokio::test]
async fn stored_arguments_are_replayed_on_every_mount() {
    let tmp = tempfile::tempdir().unwrap();
    let system = Arc::new(RecordingSystem::default());
    let driver = driver(tmp.path(), system.clone());

    driver
        .create(
            &CreateRequest::new("vol1")
                .with_option("device", "/dev/sdb1")
                .with_option("type", "xfs"),
        )
        .await
        .unwrap();

    for id in ["first", "second"] {
        let req = MountRequest::new("vol1", id);
        driver.mount(&req).await.unwrap();
        driver.unmount(&req).await.unwrap();
    }

    let calls = system.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].1[..3], calls[1].1[..3]);
    assert_eq!(calls[0].1[..3], ["-t", "xfs", "/dev/sdb1"]);
}

#[tokio::test]
async fn second_create_with_other_options_keeps_the_first() {
    let tmp = tempfile::tempdir().unwrap();
    let driver = driver(tmp.path(), Arc::default());

    let first = CreateRequest::new("vol1")
        .with_option("device", "/dev/sdb1")
        .with_option("type", "xfs");
    driver.create(&first).await.unwrap();
    let before = driver.get("vol1").await.unwrap();

    let err = driver
        .create(&CreateRequest::new("vol1").with_option("device", "/dev/sdc9"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let after = driver.get("vol1").await.unwrap();
    assert_eq!(after.options, first.options);
    assert_eq!(after.status, before.status);
    assert_eq!(
        after.status.extra.get("args"),
        Some(&StatusValue::List(vec![
            "-t".into(),
            "xfs".into(),
            "/dev/sdb1".into()
        ]))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_of_one_name() {
    let tmp = tempfile::tempdir().unwrap();
    let driver = driver(tmp.path(), Arc::default());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let driver = Arc::clone(&driver);
        handles.push(tokio::spawn(async move {
            driver
                .create(&CreateRequest::new("shared").with_option("device", "/dev/sdb1"))
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => created += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mounts_never_overlap() {
    let tmp = tempfile::tempdir().unwrap();
    let system = Arc::new(RecordingSystem {
        delay: Some(Duration::from_millis(20)),
        ..Default::default()
    });
    let driver = driver(tmp.path(), system.clone());

    let mut handles = Vec::new();
    for i in 0..4 {
        let name = format!("vol{i}");
        driver
            .create(&CreateRequest::new(&name).with_option("device", "/dev/sdb1"))
            .await
            .unwrap();
        let driver = Arc::clone(&driver);
        handles.push(tokio::spawn(async move {
            driver
                .mount(&MountRequest::new(name, format!("id{i}")))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(system.calls.lock().unwrap().len(), 4);
    assert_eq!(system.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn serves_plugin_protocol_on_unix_socket() {
    let tmp = tempfile::tempdir().unwrap();
    let driver = driver(tmp.path(), Arc::default());
    let socket = driver.config().socket_path(tmp.path().join("plugins"));

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = PluginServer::new(Arc::clone(&driver));
    let serve_socket = socket.clone();
    let task = tokio::spawn(async move {
        server
            .serve(&serve_socket, async {
                let _ = stop_rx.await;
            })
            .await
    });

    let mut stream = None;
    for _ in 0..100 {
        if let Ok(s) = tokio::net::UnixStream::connect(&socket).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut stream = stream.expect("server did not start listening");

    let body = r#"{"Name":"vol1","Opts":{"device":"/dev/sdb1"}}"#;
    let request = format!(
        "POST /VolumeDriver.Create HTTP/1.1\r\nHost: plugin\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains(r#"{"Err":""}"#), "{response}");
    assert_eq!(
        driver.get("vol1").await.unwrap().options,
        HashMap::from([("device".to_owned(), "/dev/sdb1".to_owned())])
    );

    stop_tx.send(()).unwrap();
    task.await.unwrap().unwrap();
    assert!(!socket.exists());
}
