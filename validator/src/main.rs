use {
  crate::settings::SystemSettings,
  clap::Parser,
  ed25519_dalek::Keypair,
  metrics_exporter_prometheus::PrometheusBuilder,
  std::net::{Ipv4Addr, SocketAddr},
  tokio::time::{interval, MissedTickBehavior},
  tracing::{info, subscriber::set_global_default, warn},
  tracing_subscriber::{EnvFilter, FmtSubscriber},
  trellis_network::Config,
  trellis_primitives::{
    Arguments,
    ClientTransaction,
    Darc,
    Expr,
    Instruction,
    Rules,
    Signer,
    ToBase58String,
  },
  trellis_validator::{AddTransactionRequest, CreateGenesisRequest, LocalCluster},
  trellis_vm::ChainConfig,
};

mod settings;

/// Darc of the demo chain, `owner` may do everything on it.
fn demo_darc(owner: &Signer) -> Darc {
  let expr = Expr::from(owner.identity());
  Darc::new(
    Rules::new()
      .with("spawn:value", expr.clone())
      .with("invoke:value.update", expr.clone())
      .with("spawn:darc", expr.clone())
      .with("invoke:darc.evolve", expr.clone())
      .with("invoke:config.update_config", expr),
    "local cluster",
  )
}

fn demo_transaction(darc: &Darc, owner: &Signer, counter: u64) -> ClientTransaction {
  let instruction = Instruction::spawn(
    darc.instance_id(),
    "value",
    Arguments::new().with("value", counter.to_be_bytes().to_vec()),
  )
  .with_signers([(owner.identity(), counter)]);
  let mut tx = ClientTransaction::new(vec![instruction]);
  tx.sign(&[owner]);
  tx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // configure logging
  set_global_default(
    FmtSubscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .finish(),
  )?;

  // gather CLI parameters
  let settings = SystemSettings::parse();
  info!("startup settings: {settings:#?}");

  if let Some(port) = settings.metrics_port() {
    PrometheusBuilder::new()
      .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
      .install()?;
    info!("serving metrics on port {port}");
  }

  let cluster = LocalCluster::start(
    settings.cluster_size(),
    Config {
      collect_timeout: settings.collect_timeout(),
      propagation_timeout: settings.propagation_timeout(),
      ..Default::default()
    },
    settings.data_dir(),
  )
  .await?;

  let owner = Signer::new(Keypair::generate(&mut rand::thread_rng()));
  let darc = demo_darc(&owner);
  let genesis = cluster
    .leader()
    .create_genesis(CreateGenesisRequest::new(
      cluster.roster().clone(),
      darc.clone(),
      ChainConfig {
        block_interval: settings.block_time(),
        max_block_size: settings.max_block_size(),
      },
    ))
    .await?
    .block;
  let chain_id = genesis.chain_id();
  info!("chain {} is up", chain_id.to_b58());

  let mut ticker = interval(settings.submit_every());
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  let mut submitted = 0;
  let services = cluster.services();

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        // one pending transaction at a time, counters must be consecutive
        let applied = cluster.leader().signer_counter(&chain_id, &owner.identity())?;
        if applied < submitted {
          continue;
        }

        // spread submissions over the roster
        let next = applied + 1;
        let service = &services[next as usize % services.len()];
        let tx = demo_transaction(&darc, &owner, next);
        match service.add_transaction(AddTransactionRequest::new(chain_id, tx)).await {
          Ok(_) => submitted = next,
          Err(e) => warn!("{} refused a transaction: {e}", service.id()),
        }
      }
      _ = tokio::signal::ctrl_c() => {
        info!("shutting down");
        break;
      }
    }
  }

  cluster.shutdown().await;
  Ok(())
}
