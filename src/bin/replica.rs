use std::process;

use raftkv::error::{Error, Result};
use raftkv::{Replica, SeqpacketTransport};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("bootstrap failed: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (my_id, peer_ids) = parse_args(args)?;

    let mut transport = SeqpacketTransport::connect(&my_id)?;
    let mut replica = Replica::new(my_id, peer_ids);
    replica.run(&mut transport);
}

/// `replica <my_id> <peer_id>...`, at least two peers (cluster_size >= 3).
fn parse_args(mut args: Vec<String>) -> Result<(String, Vec<String>)> {
    if args.is_empty() {
        return Err(Error::InvalidConfig(
            "usage: replica <my_id> <peer_id>...".to_string(),
        ));
    }
    let my_id = args.remove(0);
    if args.len() < 2 {
        return Err(Error::InvalidConfig(format!(
            "cluster size must be at least 3 (got {} peer(s))",
            args.len()
        )));
    }
    Ok((my_id, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_fewer_than_two_peers() {
        let result = parse_args(vec!["A".into(), "B".into()]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_missing_my_id() {
        let result = parse_args(vec![]);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn accepts_minimum_cluster() {
        let (my_id, peers) = parse_args(vec!["A".into(), "B".into(), "C".into()]).unwrap();
        assert_eq!(my_id, "A");
        assert_eq!(peers, vec!["B".to_string(), "C".to_string()]);
    }
}
