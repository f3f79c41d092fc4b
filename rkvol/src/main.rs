use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use libmountvol::{
    DriverConfig, MountedVolumeDriver, PluginServer, RootHider, VolumeCallback, bootstrap,
};
use rkvol::config::PluginOptions;
use rkvol::drivers::{
    self, CifsDriver, GlusterfsDriver, NfsDriver, OsMountedDriver, PackageInstaller, S3fsDriver,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rkvol")]
#[command(about = "Docker volume plugins backed by mount helpers", long_about = None)]
struct Cli {
    #[command(flatten)]
    options: PluginOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve NFS volumes (`mount -t nfs`)
    Nfs {
        /// Options used when a volume has no `nfsopts`
        #[arg(long, env = "DEFAULT_NFSOPTS", default_value = "")]
        default_nfsopts: String,
    },
    /// Serve CIFS/SMB volumes (`mount -t cifs`)
    Cifs {
        /// Directory holding per-volume credential files
        #[arg(long, env = "CREDENTIAL_PATH")]
        credential_path: Option<PathBuf>,
    },
    /// Serve GlusterFS volumes through the native client
    Glusterfs {
        /// Gluster servers used for every volume; forbids per-volume servers
        #[arg(long, env = "SERVERS", value_delimiter = ',')]
        servers: Vec<String>,
    },
    /// Serve S3 buckets through s3fs
    S3fs {
        /// Options used when a volume has no `s3fsopts`
        #[arg(long, env = "DEFAULT_S3FSOPTS", default_value = "")]
        default_s3fsopts: String,
    },
    /// Serve volumes of a filesystem whose helper is installed at start-up
    Osmounted {
        /// Packages installed with `yum install -y`
        #[arg(long, env = "PACKAGES", value_delimiter = ',', required = true)]
        packages: Vec<String>,
        /// Shell command run after the packages are installed
        #[arg(long, env = "POSTINSTALL")]
        post_install: Option<String>,
        /// Filesystem type passed to `mount -t`
        #[arg(long, env = "MOUNT_TYPE")]
        mount_type: String,
        /// Options passed to `mount -o`
        #[arg(long, env = "MOUNT_OPTIONS", default_value = "")]
        mount_options: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.options.log_json);
    let options = cli.options;

    match cli.command {
        Commands::Nfs { default_nfsopts } => {
            serve(
                &options,
                drivers::nfs::driver_config(),
                NfsDriver::new(default_nfsopts),
            )
            .await
        }
        Commands::Cifs { credential_path } => {
            let hider = RootHider::new(&options.hide_dir);
            hide_at_startup(&hider);
            let driver = CifsDriver::new(credential_path).with_hider(hider);
            serve(&options, drivers::cifs::driver_config(), driver).await
        }
        Commands::Glusterfs { servers } => {
            serve(
                &options,
                drivers::glusterfs::driver_config(),
                GlusterfsDriver::new(servers),
            )
            .await
        }
        Commands::S3fs { default_s3fsopts } => {
            serve(
                &options,
                drivers::s3fs::driver_config(),
                S3fsDriver::new(default_s3fsopts),
            )
            .await
        }
        Commands::Osmounted {
            packages,
            post_install,
            mount_type,
            mount_options,
        } => {
            info!(?packages, ?post_install, %mount_type, %mount_options, "osmounted settings");
            let (signal, gate) = bootstrap::gate();
            PackageInstaller::new(packages, post_install).spawn(signal);

            let hider = RootHider::new(&options.hide_dir);
            hide_at_startup(&hider);
            let driver = OsMountedDriver::new(mount_type, mount_options, gate).with_hider(hider);
            serve(&options, drivers::osmounted::driver_config(), driver).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn hide_at_startup(hider: &RootHider) {
    if hider.hide().is_err() {
        warn!(dir = %hider.dir().display(), "continuing with the directory visible");
    }
}

async fn serve<C>(options: &PluginOptions, config: DriverConfig, callback: C) -> anyhow::Result<()>
where
    C: VolumeCallback + 'static,
{
    let config = options.apply(config);
    let socket = options.socket_path(&config);
    let driver = Arc::new(MountedVolumeDriver::open(config, callback)?);
    PluginServer::new(driver)
        .serve(&socket, shutdown_signal())
        .await?;
    info!("plugin stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
