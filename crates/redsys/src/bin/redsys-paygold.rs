//! Create a PayGold payment link through the RedSys REST API.
//!
//! Usage: redsys-paygold <ORDER> <AMOUNT_MINOR_UNITS> <DESTINATION_URL> <AUTH_TYPE> <USER> [DESCRIPTION]
//!
//! The order is registered in the merchant database before the request is
//! sent, with the destination password (`PAYGOLD_DESTINATION_PASSWORD`)
//! sealed under the vault key. Merchant code, terminal, currency, keys,
//! endpoint and database path come from the environment (see `RedsysConfig`).

use redsys::{AuthType, MerchantRecord, RedsysConfig, RedsysError, RestClient, SqliteMerchantStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Destination<'a> {
    url: &'a str,
    auth_type: &'a str,
    user: &'a str,
}

async fn run(
    order: &str,
    amount: &str,
    destination: Destination<'_>,
    description: Option<&str>,
) -> Result<serde_json::Value, RedsysError> {
    let config = RedsysConfig::from_env()?;
    tracing::info!(?config, "loaded configuration");

    let auth_type: AuthType = destination.auth_type.parse()?;
    let password = std::env::var("PAYGOLD_DESTINATION_PASSWORD").unwrap_or_default();
    let record = MerchantRecord::new(destination.url, config.require_vault_key()?)
        .seal_credentials(auth_type, destination.user, &password)?;

    let mut request = config.paygold_request(order, amount)?;
    request.product_description = description.map(str::to_string);

    let store = SqliteMerchantStore::open(&config.merchant_db_path)?;
    let signed = request.sign_and_register(config.require_paygold_key()?, record, &store)?;

    let client = RestClient::new(config.rest_url.as_str())?;
    tracing::info!(order = %order, url = %client.url(), "sending PayGold request");
    client.send(&signed).await
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (order, amount, url, auth_type, user, description) = match args.as_slice() {
        [order, amount, url, auth_type, user] => (order, amount, url, auth_type, user, None),
        [order, amount, url, auth_type, user, description] => {
            (order, amount, url, auth_type, user, Some(description.as_str()))
        }
        _ => {
            eprintln!(
                "Usage: redsys-paygold <ORDER> <AMOUNT_MINOR_UNITS> <DESTINATION_URL> <AUTH_TYPE> <USER> [DESCRIPTION]"
            );
            std::process::exit(2);
        }
    };
    let destination = Destination {
        url,
        auth_type,
        user,
    };

    match run(order, amount, destination, description).await {
        Ok(reply) => {
            println!("{}", serde_json::to_string_pretty(&reply).unwrap_or_default());
        }
        Err(e) => {
            tracing::error!(error = %e, "PayGold request failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
