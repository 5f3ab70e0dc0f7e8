//! end-to-end ceremonies
//!
//! ties together: initialize, unseal, rekey, root token rotation, rekey
//! backup housekeeping

use tracing::info;

use crate::backend::{InitOptions, RekeyBackup, RekeyParams, SystemBackend};
use crate::ceremony::{
    CeremonyClient, GenerateRoot, GenerateRootParams, Rekey, Unseal, UnsealOutcome,
};
use crate::codec::OneTimePad;
use crate::share::{KeyShare, MasterCredentials};
use crate::{Error, Result};

/// drives whole ceremonies against one backend
pub struct Bootstrap<B: SystemBackend> {
    backend: B,
}

impl<B: SystemBackend> Bootstrap<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// fine-grained unseal client
    pub fn unseal_client(&self) -> CeremonyClient<'_, B, Unseal> {
        CeremonyClient::new(&self.backend)
    }

    /// fine-grained rekey client
    pub fn rekey_client(&self) -> CeremonyClient<'_, B, Rekey> {
        CeremonyClient::new(&self.backend)
    }

    /// fine-grained root generation client
    pub fn generate_root_client(&self) -> CeremonyClient<'_, B, GenerateRoot> {
        CeremonyClient::new(&self.backend)
    }

    pub fn is_initialized(&self) -> Result<bool> {
        self.backend.is_initialized()
    }

    /// initialize the server, then unseal it with the issued shares
    ///
    /// # flow
    /// 1. initialize (fails with `AlreadyInitialized` on a second run)
    /// 2. initiate unseal
    /// 3. submit issued shares until the server reports unsealed
    pub fn initialize_and_unseal(&self, options: &InitOptions) -> Result<MasterCredentials> {
        options.validate()?;
        let credentials = self.backend.initialize(options)?;
        info!(
            "initialized: {} shares, threshold {}",
            credentials.shares.len(),
            options.secret_threshold
        );

        let outcome = self.unseal(&credentials.shares)?;
        if outcome.sealed {
            return Err(Error::InvalidSession(
                "unseal completed but server still sealed".into(),
            ));
        }
        Ok(credentials)
    }

    /// seal the server
    pub fn seal(&self) -> Result<()> {
        self.backend.seal()?;
        info!("sealed");
        Ok(())
    }

    /// quick unseal: initiate and submit shares until unsealed
    pub fn unseal(&self, shares: &[KeyShare]) -> Result<UnsealOutcome> {
        let outcome = self.unseal_client().run(&(), shares)?;
        info!("unsealed");
        Ok(outcome)
    }

    /// generate a new root token and decode it with `otp`
    pub fn rotate_root_token(&self, otp: &OneTimePad, shares: &[KeyShare]) -> Result<String> {
        let params = GenerateRootParams::new(otp.clone());
        let encoded = self.generate_root_client().run(&params, shares)?;
        let token = encoded.decode(otp)?;
        info!("root token rotated");
        Ok(token)
    }

    /// replace the share set; the root token is unaffected
    pub fn rekey(
        &self,
        params: &RekeyParams,
        credentials: &MasterCredentials,
    ) -> Result<MasterCredentials> {
        let shares = self.rekey_client().run(params, &credentials.shares)?;
        info!(
            "rekeyed: {} shares, threshold {}",
            shares.len(),
            params.secret_threshold
        );
        Ok(credentials.with_shares(shares))
    }

    /// backup of the last rekey run with `backup`
    pub fn rekey_backup(&self) -> Result<Option<RekeyBackup>> {
        self.backend.rekey_backup_keys()
    }

    /// delete the rekey backup once the new shares are safely distributed
    pub fn delete_rekey_backup(&self) -> Result<()> {
        self.backend.delete_rekey_backup_keys()?;
        info!("rekey backup deleted");
        Ok(())
    }
}
