//! Sample project lists used across the integration suites.

#![allow(dead_code)]

use airdrop_screen::models::batch::ProjectRequest;

/// The two-project batch from the screening walkthrough: one established
/// protocol and one obvious scam.
pub fn layerzero_and_scamchain() -> Vec<ProjectRequest> {
    vec![
        ProjectRequest::new("LayerZero", "Cross-chain messaging"),
        ProjectRequest::new("ScamChain", "Anonymous, zero liquidity"),
    ]
}

/// Three projects with distinct names for ordering checks.
pub fn three_projects() -> Vec<ProjectRequest> {
    vec![
        ProjectRequest::new("Alpha", "Lending market with audited contracts"),
        ProjectRequest::new("Bravo", "NFT launchpad, team partially doxxed"),
        ProjectRequest::new("Charlie", "Meme token, liquidity unlocked"),
    ]
}

pub fn single(name: &str) -> Vec<ProjectRequest> {
    vec![ProjectRequest::new(name, format!("{name} testnet points campaign"))]
}
