use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Field capacities for [`ResolverContext`], matching the fixed-size buffers
/// used by deployed EPC resolvers (3GPP TS 29.303 discovery identifiers).
pub const MAX_TARGET_LEN: usize = 7;
pub const MAX_INTERFACE_LEN: usize = 7;
pub const MAX_PROTOCOL_LEN: usize = 7;
pub const MAX_APN_LEN: usize = 31;
pub const MAX_MNC_LEN: usize = 7;
pub const MAX_MCC_LEN: usize = 7;
pub const MAX_DOMAIN_SUFFIX_LEN: usize = 63;

/// Capacity of the working domain name built from the context and rewritten
/// across NAPTR hops.
pub const MAX_DOMAIN_NAME_LEN: usize = 127;

/// Caller-supplied identity and lookup parameters for one resolution pass.
///
/// `target`, `interface` and `protocol` are the 3GPP service tokens that end
/// up in the desired NAPTR service strings (`x-3gpp-<target>` and
/// `x-<interface>-<protocol>`). An empty `apn` selects the EPC root domain
/// form of the discovery FQDN.
///
/// # Examples
///
/// ```
/// use epcdns::context::ResolverContext;
///
/// let ctx = ResolverContext {
///     target: "pgw".into(),
///     interface: "s5".into(),
///     protocol: "gtp".into(),
///     apn: "mms".into(),
///     mnc: "001".into(),
///     mcc: "100".into(),
///     domain_suffix: "3gppnetwork.org".into(),
/// };
///
/// let fqdn = ctx.build_domain_name().unwrap();
/// assert_eq!(fqdn, "mms.apn.epc.mnc001.mcc100.3gppnetwork.org");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverContext {
    /// Service target token, e.g. "sgw" or "pgw"
    pub target: String,
    /// Interface token, e.g. "s5", "s8" or "s11"
    pub interface: String,
    /// Protocol token, e.g. "gtp"; may be empty
    pub protocol: String,
    /// Access point name; empty means "no APN, use the EPC root domain"
    pub apn: String,
    /// Mobile network code, zero-padded numeric string
    pub mnc: String,
    /// Mobile country code, zero-padded numeric string
    pub mcc: String,
    /// DNS zone suffix appended to the constructed FQDN
    pub domain_suffix: String,
}

impl ResolverContext {
    /// Checks every field against its capacity.
    pub fn validate(&self) -> Result<()> {
        check_len("target", &self.target, MAX_TARGET_LEN)?;
        check_len("interface", &self.interface, MAX_INTERFACE_LEN)?;
        check_len("protocol", &self.protocol, MAX_PROTOCOL_LEN)?;
        check_len("apn", &self.apn, MAX_APN_LEN)?;
        check_len("mnc", &self.mnc, MAX_MNC_LEN)?;
        check_len("mcc", &self.mcc, MAX_MCC_LEN)?;
        check_len("domain_suffix", &self.domain_suffix, MAX_DOMAIN_SUFFIX_LEN)?;
        Ok(())
    }

    /// Builds the initial discovery FQDN for this context.
    ///
    /// With an APN: `<apn>.apn.epc.mnc<MNC>.mcc<MCC>.<suffix>`.
    /// Without one: `epc.mnc<MNC>.mcc<MCC>.<suffix>`.
    ///
    /// The returned string is the accumulator the resolution loop rewrites in
    /// place on each NAPTR hop. Fails when the formatted name would not fit
    /// the domain name capacity.
    pub fn build_domain_name(&self) -> Result<String> {
        self.validate()?;

        let name = if self.apn.is_empty() {
            format!("epc.mnc{}.mcc{}.{}", self.mnc, self.mcc, self.domain_suffix)
        } else {
            format!(
                "{}.apn.epc.mnc{}.mcc{}.{}",
                self.apn, self.mnc, self.mcc, self.domain_suffix
            )
        };

        if name.len() > MAX_DOMAIN_NAME_LEN {
            bail!(
                "discovery FQDN '{}' exceeds {} characters",
                name,
                MAX_DOMAIN_NAME_LEN
            );
        }

        Ok(name)
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.len() > max {
        bail!("{} '{}' exceeds {} characters", field, value, max);
    }
    Ok(())
}
