//! Run a command and copy a file on a real host.
//!
//! Run with: `cargo run --example ssh -- <host> [user]`
//!
//! Authentication uses the agent and the default identity files; set
//! `SSH_DRIVER_*` variables to override port, user, key or retries.

use ssh_driver::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ssh_driver=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(host) = args.next() else {
        eprintln!("usage: ssh <host> [user]");
        return Ok(());
    };
    let mut config = DriverConfig::from_env(host);
    if let Some(user) = args.next() {
        config = config.user(user);
    }

    let mut client = SshClient::connect(config).await?;
    println!("authenticated with {}", client.auth_method());

    let mut run = client.run_command("uname -a", CommandOptions::new()).await?;
    for line in run.stdout.collect().await? {
        println!("stdout: {line}");
    }
    for line in run.stderr.collect().await? {
        println!("stderr: {line}");
    }
    client.wait_finished(Some(&mut run.channel)).await?;
    println!("exit status: {}", run.channel.exit_status()?);

    let local = std::env::temp_dir().join("ssh-driver-hostname");
    client.copy_remote_file("/etc/hostname", &local, false).await?;
    println!("copied /etc/hostname to {}", local.display());

    client.disconnect().await
}
