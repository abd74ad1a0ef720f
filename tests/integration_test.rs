use deployflow::chain::DevTxStatus;
use deployflow::core::{VertexEvent, VertexId};
use deployflow::{
    transform, ActionOptions, Artifact, ArtifactStore, DeployError, DevChain, DevChainConfig,
    EngineConfig, Executor, JsonParameters, ModuleBuilder, ModuleFile, ParamErrorKind,
    VertexOutcome, VertexOutput,
};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const VAULT_MODULE: &str = r#"
name: Vault
actions:
  - id: math
    library: Math
  - id: token
    contract: Token
    args: ["Gold", { param: supply }]
    libraries: { Math: { ref: math } }
  - id: vault
    contract: Vault
    args: [{ ref: token }]
  - id: approve
    call: token
    method: approve
    args: [{ ref: vault }, { param: supply }]
  - id: fund
    send_eth: { ref: vault }
    value: "1000000000000000000"
    after: [approve]
"#;

fn artifacts() -> ArtifactStore {
    let erc20 = json!([
        {"type": "function", "name": "approve"},
        {"type": "function", "name": "transfer"}
    ]);
    ArtifactStore::new()
        .with(Artifact::new("Math", "0x6001"))
        .with(Artifact::new("Token", "0x6002").with_abi(erc20))
        .with(Artifact::new("Vault", "0x6003").with_abi(json!([])))
}

fn fast_engine() -> EngineConfig {
    EngineConfig::default().with_poll_interval_ms(1)
}

fn drain(events: &mut tokio::sync::mpsc::UnboundedReceiver<VertexEvent>) -> Vec<VertexEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_module_deploys_in_dependency_order() {
    let graph = ModuleFile::parse(VAULT_MODULE)
        .unwrap()
        .build(Path::new("."))
        .unwrap();
    let params = JsonParameters::from_pairs([("supply", json!(5000))]);
    let plan = transform(&graph, &artifacts(), &params).unwrap();
    assert_eq!(plan.len(), 5);

    let chain = Arc::new(DevChain::new(DevChainConfig::default()));
    let (executor, mut events) = Executor::new(chain.services(), fast_engine());
    let result = executor.execute(&plan).await.unwrap();
    assert!(result.is_success());

    // every vertex starts only after all its dependencies completed
    let mut completed: Vec<VertexId> = Vec::new();
    for event in drain(&mut events) {
        match event {
            VertexEvent::Started { id, .. } => {
                for dep in plan.adjacency().dependencies(id) {
                    assert!(completed.contains(&dep), "{} started before {}", id, dep);
                }
            }
            VertexEvent::Completed { id, .. } => completed.push(id),
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(completed.len(), 5);

    // the vault was constructed with the token's deployed address
    let token = graph.find("Vault#Token").unwrap().id;
    let vault = graph.find("Vault#Vault").unwrap().id;
    let token_address = match result.output(token) {
        Some(VertexOutput::Contract { address, .. }) => address.clone(),
        other => panic!("unexpected output {:?}", other),
    };
    let signer = chain.config().account.clone();
    let sent = chain
        .transactions_from(&deployflow::chain::Address::new(signer))
        .unwrap();
    assert_eq!(sent.len(), 5);
    let vault_tx = result.output(vault).and_then(|o| o.transaction()).unwrap();
    let vault_deploy = sent.iter().find(|tx| &tx.hash == vault_tx).unwrap();
    match &vault_deploy.request.data {
        deployflow::chain::TxData::Deploy { args, .. } => {
            assert_eq!(args, &vec![json!(token_address.as_str())])
        }
        other => panic!("unexpected payload {:?}", other),
    }

    // one nonce per transaction, no gaps
    let mut nonces: Vec<u64> = sent.iter().map(|tx| tx.nonce).collect();
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
    assert!(sent
        .iter()
        .all(|tx| matches!(tx.status, DevTxStatus::Mined { success: true, .. })));
}

#[tokio::test]
async fn test_reverted_call_skips_only_its_dependents() {
    let mut m = ModuleBuilder::new("M");
    let token = m
        .contract("Token", ActionOptions::new().arg(json!("Gold")).arg(json!(1)))
        .unwrap();
    let burn = m.call(&token, "burn", ActionOptions::new()).unwrap();
    let refund = m
        .send_eth(&token, json!(1), ActionOptions::new().after(&burn))
        .unwrap();
    let independent = m.contract("Vault", ActionOptions::new()).unwrap();
    let graph = m.build().unwrap();

    let plan = transform(&graph, &artifacts(), &JsonParameters::none()).unwrap();
    let chain = Arc::new(DevChain::new(DevChainConfig::default()));
    let (executor, mut events) = Executor::new(chain.services(), fast_engine());
    let result = executor.execute(&plan).await.unwrap();

    assert!(!result.is_success());
    assert!(result.output(token.id).is_some());
    assert!(result.output(independent.id).is_some());
    assert!(matches!(
        result.report(burn.id).unwrap().outcome,
        VertexOutcome::Failed(DeployError::TransactionReverted { .. })
    ));
    assert_eq!(
        result.report(refund.id).unwrap().outcome,
        VertexOutcome::Skipped {
            cause: "M#Token.burn".into()
        }
    );

    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, VertexEvent::Started { id, .. } if *id == refund.id)));
    assert!(events
        .iter()
        .any(|e| matches!(e, VertexEvent::Skipped { id, .. } if *id == refund.id)));
}

#[test]
fn test_parameter_errors_surface_before_execution() {
    let graph = ModuleFile::parse(VAULT_MODULE)
        .unwrap()
        .build(Path::new("."))
        .unwrap();

    let err = transform(&graph, &artifacts(), &JsonParameters::none()).unwrap_err();
    assert_eq!(
        err,
        DeployError::Parameter {
            label: "supply".into(),
            kind: ParamErrorKind::NoParams
        }
    );

    let err = transform(&graph, &artifacts(), &JsonParameters::from_map(HashMap::new())).unwrap_err();
    assert_eq!(
        err.to_string(),
        "No parameter provided for \"supply\""
    );
}

#[test]
fn test_stalled_transfer_is_bumped_until_mined() {
    let mut m = ModuleBuilder::new("M");
    m.send_eth(json!("0x00000000000000000000000000000000000000b0"), json!(7), ActionOptions::new())
        .unwrap();
    let plan = transform(&m.build().unwrap(), &artifacts(), &JsonParameters::none()).unwrap();

    // quoted price stays below the floor; only bumps can reach it
    let chain = Arc::new(DevChain::new(DevChainConfig {
        gas_price: 100,
        min_gas_price: 130,
        ..Default::default()
    }));
    let (executor, _events) = Executor::new(chain.services(), fast_engine());
    let result = tokio_test::block_on(executor.execute(&plan)).unwrap();
    assert!(result.is_success());

    let signer = deployflow::chain::Address::new(chain.config().account.clone());
    let sent = chain.transactions_from(&signer).unwrap();
    let prices: Vec<u128> = sent
        .iter()
        .map(|tx| tx.request.fee.unwrap().effective_price())
        .collect();
    assert_eq!(prices, vec![100, 111, 123, 136]);
    assert!(sent.iter().all(|tx| tx.nonce == 0));
}
