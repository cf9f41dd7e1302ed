use acme2_manager::Client;
use acme2_manager::ClientConfig;
use acme2_manager::Error;
use acme2_manager::Proof;
use tracing_subscriber::EnvFilter;

/// Usage: `issue <config.toml> <fqdn> [alt names...]`
#[tokio::main]
async fn main() -> Result<(), Error> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut args = std::env::args().skip(1);
  let (config_path, fqdn) = match (args.next(), args.next()) {
    (Some(config_path), Some(fqdn)) => (config_path, fqdn),
    _ => {
      return Err(Error::Config(
        "usage: issue <config.toml> <fqdn> [alt names...]".to_string(),
      ))
    }
  };
  let alt_names: Vec<String> = args.collect();

  // The config names the authority, the account to use (it is registered
  // on first use), the storage directory and the web root the http-01 proof
  // goes into.
  let config = ClientConfig::load(&config_path).await?;
  let client = Client::new(config).await?;

  // Print what will be checked, for operators solving by hand.
  for name in std::iter::once(&fqdn).chain(alt_names.iter()) {
    let info = client.get_challenge_data(name, None).await?;
    match &info.proof {
      Proof::HttpFile { url, .. } => println!("{} will be fetched", url),
      Proof::DnsTxt { .. } => println!("publish {}", info.proof),
    }
  }

  // Renew when a certificate exists already, otherwise prove ownership of
  // every name and sign.
  let cert = match client.find_certificate(&fqdn).await {
    Ok(_) => client.renew_certificate(&fqdn).await?,
    Err(err) if err.is_not_found() => {
      client.obtain_certificate(&fqdn, &alt_names, None).await?
    }
    Err(err) => return Err(err),
  };

  println!("certificate for {} expires at {}", cert.fqdn, cert.expire_at);
  println!("{}", cert.to_pem()?);
  Ok(())
}
