//! Mock testing example.
//!
//! Drives a full session against the in-memory server: authentication,
//! a command with scripted output and a recursive upload.
//!
//! Run with: `cargo run --example mock_testing --features mock`

#[cfg(feature = "mock")]
use ssh_driver::mock::{self, CommandScript, MockServer};
#[cfg(feature = "mock")]
use ssh_driver::{CommandOptions, DriverConfig};

#[cfg(not(feature = "mock"))]
fn main() {
    println!("This example requires the 'mock' feature.");
}

#[cfg(feature = "mock")]
#[tokio::main]
async fn main() -> ssh_driver::Result<()> {
    let server = MockServer::new()
        .would_block(2)
        .accept_password("secret")
        .respond(
            CommandScript::new()
                .stdout("Filesystem  Size\n/dev/sda1   ")
                .stdout("40G\n")
                .stderr("df: /proc: warning\n"),
        );

    let config = DriverConfig::new("mock-host")
        .user("demo")
        .allow_agent(false)
        .identities(Vec::<std::path::PathBuf>::new())
        .password("secret");
    let mut driver = mock::driver(&server, config).await?;
    println!("1. authenticated with {}", driver.auth_method());

    let mut run = driver.run_command("df -h", CommandOptions::new().sudo()).await?;
    println!("2. ran {:?}", server.commands());
    for line in run.stdout.collect().await? {
        println!("   stdout: {line}");
    }
    for line in run.stderr.collect().await? {
        println!("   stderr: {line}");
    }
    driver.wait_finished(Some(&mut run.channel)).await?;

    let dir = std::env::temp_dir().join("ssh-driver-mock-demo");
    std::fs::create_dir_all(dir.join("conf"))?;
    std::fs::write(dir.join("conf/app.toml"), "port = 8080\n")?;
    std::fs::write(dir.join("README"), "demo\n")?;

    let copied = driver.copy_file(&dir, "/srv/demo", true).await?;
    println!("3. uploaded {copied} files: {:?}", server.files());
    println!("   directories created: {:?}", server.mkdir_calls());
    println!("   would-block rounds absorbed: {}", server.would_blocks());

    driver.disconnect().await
}
