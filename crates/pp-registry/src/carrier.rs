use alloy_primitives::Address;
use pp_crypto::FreshnessWindow;
use pp_ledger::{Call, RegistryEvent, Transaction, TxReceipt};
use pp_types::{ChipAttestation, ContentLocator};

use crate::context::{expect_event, RegistryContext};
use crate::error::RegistryResult;

/// Writes and reads the metadata locator stored per chip, so a tapped chip
/// resolves to its passport. Each chip can be written once.
#[derive(Clone)]
pub struct ChipCarrierBinder {
    ctx: RegistryContext,
    program: Address,
    window: FreshnessWindow,
}

impl ChipCarrierBinder {
    pub fn new(ctx: RegistryContext, program: Address) -> Self {
        Self {
            ctx,
            program,
            window: FreshnessWindow::default(),
        }
    }

    /// Store `metadata` for the attested chip. `AlreadySet` if the chip
    /// already carries a locator.
    pub async fn bind(
        &self,
        attestation: &ChipAttestation,
        metadata: &ContentLocator,
    ) -> RegistryResult<TxReceipt> {
        let head = self.ctx.ledger.block_number().await?;
        self.window
            .check(attestation.block_number_used_in_sig, head + 1)?;

        let chip = attestation.chip_address;
        let uri = metadata.to_uri();
        let receipt = self
            .ctx
            .submit(
                self.program,
                &Transaction::InitMetadataUri {
                    chip,
                    signature: attestation.signature,
                    block_number_used_in_sig: attestation.block_number_used_in_sig,
                    uri: uri.clone(),
                },
            )
            .await?;
        expect_event(&receipt, "MetadataURIInitialized", |e| {
            matches!(e, RegistryEvent::MetadataUriInitialized { chip: c, uri: u } if *c == chip && *u == uri)
        })?;
        tracing::info!(%chip, %uri, "chip carrier bound");
        Ok(receipt)
    }

    /// Metadata locator stored for `chip`, if any.
    pub async fn resolve(&self, chip: Address) -> RegistryResult<Option<ContentLocator>> {
        let uri = self
            .ctx
            .ledger
            .call(self.program, &Call::MetadataUri { chip })
            .await?
            .into_text()?;
        if uri.is_empty() {
            return Ok(None);
        }
        Ok(Some(ContentLocator::parse(&uri)?))
    }
}
