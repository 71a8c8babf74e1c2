mod actuator;
mod eeprom;
mod host;
mod ntp;
mod zone;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
