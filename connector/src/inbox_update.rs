use interop_types::{
    CcmsAtHeight, CrossChainUpdateParams, InboxUpdate, LastSentCcm, OutboxRootWitness,
};
use log::debug;

/// One relayable CCM with the cursor position and witness of its batch.
struct PendingCcm {
    bytes: Vec<u8>,
    height: u32,
    nonce: u64,
}

pub struct InboxUpdateOutcome {
    pub inbox_update: InboxUpdate,
    /// Cursor of the last included CCM, if any was included.
    pub last_included: Option<LastSentCcm>,
    pub included: usize,
    pub pending: usize,
}

/// Build the inbox update: gather CCMs past the `from` cursor up to
/// `up_to_height` (the new certificate's height, or the standing certified
/// height when none was extracted), then append serialized messages while
/// the whole encoded CCU stays within `max_ccu_size`. A partial batch
/// carries the right witness over the gathered leaves; the outbox-root
/// witness is the inclusion proof of the last included batch.
#[must_use]
pub fn build_inbox_update(
    ccm_records: &[CcmsAtHeight],
    from: LastSentCcm,
    up_to_height: u32,
    base_params: &CrossChainUpdateParams,
    max_ccu_size: usize,
) -> InboxUpdateOutcome {
    let mut pending: Vec<PendingCcm> = Vec::new();
    let mut witness_by_height: Vec<(u32, &OutboxRootWitness)> = Vec::new();
    for record in ccm_records {
        if record.height < from.height || record.height > up_to_height {
            continue;
        }
        witness_by_height.push((record.height, &record.inclusion_proof));
        for ccm in &record.ccms {
            if record.height == from.height && ccm.nonce <= from.nonce {
                continue;
            }
            pending.push(PendingCcm {
                bytes: ccm.to_bytes(),
                height: record.height,
                nonce: ccm.nonce,
            });
        }
    }

    // Greedy fill, then shrink until the full encoding (witnesses included)
    // fits the budget.
    let mut included = 0;
    let mut params = base_params.clone();
    for ccm in &pending {
        params.inbox_update.cross_chain_messages.push(ccm.bytes.clone());
        if params.to_bytes().len() > max_ccu_size {
            params.inbox_update.cross_chain_messages.pop();
            break;
        }
        included += 1;
    }

    loop {
        let inbox_update = assemble(&pending, included, &witness_by_height);
        params.inbox_update = inbox_update;
        if included == 0 || params.to_bytes().len() <= max_ccu_size {
            break;
        }
        included -= 1;
    }

    if included < pending.len() {
        debug!(target: "connector", "inbox update truncated to {included} of {} pending ccm(s)",
            pending.len());
    }

    InboxUpdateOutcome {
        inbox_update: params.inbox_update,
        last_included: included.checked_sub(1).map(|last| LastSentCcm {
            height: pending[last].height,
            nonce: pending[last].nonce,
        }),
        included,
        pending: pending.len(),
    }
}

fn assemble(
    pending: &[PendingCcm],
    included: usize,
    witness_by_height: &[(u32, &OutboxRootWitness)],
) -> InboxUpdate {
    let cross_chain_messages: Vec<Vec<u8>> = pending[..included]
        .iter()
        .map(|ccm| ccm.bytes.clone())
        .collect();

    let message_witness_hashes = if included == pending.len() {
        Vec::new()
    } else {
        let leaves: Vec<Vec<u8>> = pending.iter().map(|ccm| ccm.bytes.clone()).collect();
        merkle_tools::calculate_right_witness(&leaves, included)
    };

    let outbox_root_witness = included
        .checked_sub(1)
        .and_then(|last| {
            let height = pending[last].height;
            witness_by_height
                .iter()
                .find(|(h, _)| *h == height)
                .map(|(_, witness)| (*witness).clone())
        })
        .unwrap_or_default();

    InboxUpdate {
        cross_chain_messages,
        message_witness_hashes,
        outbox_root_witness,
    }
}
