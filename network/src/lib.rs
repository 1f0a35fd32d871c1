mod collect;
mod config;
mod history;
mod local;
mod network;
mod propagate;
mod topology;
mod transport;
mod wire;

pub use {
  collect::Collection,
  config::Config,
  history::History,
  local::LocalNetwork,
  network::{serve, Network},
  propagate::Propagation,
  topology::{Tree, TreeError},
  transport::{Error, Handler, Transport},
  wire::{ApplyNotice, Batch, CollectRequest, Request, Response},
};
