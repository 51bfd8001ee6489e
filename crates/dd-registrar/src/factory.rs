/// Build registrar clients from configuration.
///
/// A [`ProviderConfig`] names one configured registrar account. Credentials
/// live in [`ProviderSettings`], a serde enum tagged by `provider`, so a TOML
/// section such as
///
/// ```toml
/// [[providers]]
/// name = "main"
/// provider = "porkbun"
/// api_key = "pk1_..."
/// secret_key = "sk1_..."
/// ```
///
/// deserializes straight into the value [`build_registrar`] consumes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::cloudflare::CloudflareRegistrarClient;
use crate::domainnameapi::DomainNameApiClient;
use crate::gandi::GandiClient;
use crate::godaddy::GoDaddyClient;
use crate::google::GoogleDomainsClient;
use crate::namecheap::NamecheapClient;
use crate::namecom::NameComClient;
use crate::opensrs::OpenSrsClient;
use crate::porkbun::PorkbunClient;
use crate::resellerclub::ResellerClubClient;
use crate::route53::Route53DomainsClient;
use crate::sandbox::SandboxClient;
use crate::signed::SignedRestClient;
use crate::signing::SignatureEncoding;
use crate::transport::TransportOptions;
use crate::types::RegistrarProvider;
use crate::RegistrarClient;

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("{provider} provider '{name}' requires '{field}'")]
    MissingField {
        name: String,
        provider: RegistrarProvider,
        field: &'static str,
    },
    #[error("provider name '{0}' is configured more than once")]
    DuplicateName(String),
}

/// One configured registrar account.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Use the vendor's sandbox/OTE endpoint where one exists.
    #[serde(default)]
    pub sandbox: bool,
    /// Override the vendor base URL (required for `signed`).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderSettings {
    Cloudflare {
        api_key: String,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        account_id: Option<String>,
    },
    Porkbun {
        api_key: String,
        secret_key: String,
    },
    Namecheap {
        api_user: String,
        api_key: String,
        client_ip: String,
    },
    GoDaddy {
        api_key: String,
        api_secret: String,
        #[serde(default)]
        consent_ip: Option<String>,
    },
    Google {
        access_token: String,
        project: String,
        location: String,
    },
    NameCom {
        username: String,
        token: String,
    },
    Route53 {
        access_key_id: String,
        secret_access_key: String,
    },
    OpenSrs {
        username: String,
        api_key: String,
    },
    DomainNameApi {
        username: String,
        password: String,
    },
    ResellerClub {
        auth_user_id: String,
        api_key: String,
        customer_id: String,
    },
    Gandi {
        token: String,
        #[serde(default)]
        sharing_id: Option<String>,
    },
    Signed {
        api_key: String,
        api_secret: String,
        #[serde(default)]
        encoding: SignatureEncoding,
    },
    Sandbox {
        #[serde(default)]
        rdap_base: Option<String>,
    },
}

impl ProviderSettings {
    pub fn provider(&self) -> RegistrarProvider {
        match self {
            Self::Cloudflare { .. } => RegistrarProvider::Cloudflare,
            Self::Porkbun { .. } => RegistrarProvider::Porkbun,
            Self::Namecheap { .. } => RegistrarProvider::Namecheap,
            Self::GoDaddy { .. } => RegistrarProvider::GoDaddy,
            Self::Google { .. } => RegistrarProvider::Google,
            Self::NameCom { .. } => RegistrarProvider::NameCom,
            Self::Route53 { .. } => RegistrarProvider::Route53,
            Self::OpenSrs { .. } => RegistrarProvider::OpenSrs,
            Self::DomainNameApi { .. } => RegistrarProvider::DomainNameApi,
            Self::ResellerClub { .. } => RegistrarProvider::ResellerClub,
            Self::Gandi { .. } => RegistrarProvider::Gandi,
            Self::Signed { .. } => RegistrarProvider::SignedRest,
            Self::Sandbox { .. } => RegistrarProvider::Sandbox,
        }
    }
}

/// Build the client for one provider section.
///
/// With `simulate` set every section is served by the sandbox adapter, so a
/// demo configuration can keep real credentials without touching them.
pub fn build_registrar(
    config: &ProviderConfig,
    options: &TransportOptions,
    simulate: bool,
) -> Result<Arc<dyn RegistrarClient>, FactoryError> {
    if simulate {
        let rdap_base = match &config.settings {
            ProviderSettings::Sandbox { rdap_base } => rdap_base.as_deref(),
            _ => None,
        };
        tracing::debug!(name = %config.name, provider = %config.settings.provider(), "simulated registrar");
        return Ok(Arc::new(SandboxClient::new(rdap_base, options)));
    }

    let sandbox = config.sandbox;
    let base_url = config.base_url.as_deref();
    tracing::debug!(name = %config.name, provider = %config.settings.provider(), sandbox, "building registrar client");

    macro_rules! finish {
        ($client:expr) => {{
            let client = $client;
            let client = match base_url {
                Some(url) => client.with_base_url(url),
                None => client,
            };
            Ok(Arc::new(client) as Arc<dyn RegistrarClient>)
        }};
    }

    match &config.settings {
        ProviderSettings::Cloudflare { api_key, email, account_id } => finish!(CloudflareRegistrarClient::new(
            api_key,
            email.as_deref(),
            account_id.as_deref(),
            options,
        )),
        ProviderSettings::Porkbun { api_key, secret_key } => {
            finish!(PorkbunClient::new(api_key, secret_key, options))
        }
        ProviderSettings::Namecheap { api_user, api_key, client_ip } => {
            finish!(NamecheapClient::new(api_user, api_key, client_ip, sandbox, options))
        }
        ProviderSettings::GoDaddy { api_key, api_secret, consent_ip } => {
            let client = GoDaddyClient::new(api_key, api_secret, sandbox, options);
            finish!(match consent_ip {
                Some(ip) => client.with_consent_ip(ip),
                None => client,
            })
        }
        ProviderSettings::Google { access_token, project, location } => {
            finish!(GoogleDomainsClient::new(access_token, project, location, options))
        }
        ProviderSettings::NameCom { username, token } => {
            finish!(NameComClient::new(username, token, sandbox, options))
        }
        ProviderSettings::Route53 { access_key_id, secret_access_key } => {
            finish!(Route53DomainsClient::new(access_key_id, secret_access_key, options))
        }
        ProviderSettings::OpenSrs { username, api_key } => {
            finish!(OpenSrsClient::new(username, api_key, sandbox, options))
        }
        ProviderSettings::DomainNameApi { username, password } => {
            finish!(DomainNameApiClient::new(username, password, sandbox, options))
        }
        ProviderSettings::ResellerClub { auth_user_id, api_key, customer_id } => {
            finish!(ResellerClubClient::new(auth_user_id, api_key, customer_id, sandbox, options))
        }
        ProviderSettings::Gandi { token, sharing_id } => {
            finish!(GandiClient::new(token, sharing_id.as_deref(), sandbox, options))
        }
        ProviderSettings::Signed { api_key, api_secret, encoding } => {
            let Some(url) = base_url else {
                return Err(FactoryError::MissingField {
                    name: config.name.clone(),
                    provider: RegistrarProvider::SignedRest,
                    field: "base_url",
                });
            };
            Ok(Arc::new(SignedRestClient::new(url, api_key, api_secret, *encoding, options)))
        }
        ProviderSettings::Sandbox { rdap_base } => {
            Ok(Arc::new(SandboxClient::new(rdap_base.as_deref().or(base_url), options)))
        }
    }
}

/// Named registrar clients, built once at startup and shared.
#[derive(Default, Clone)]
pub struct RegistrarRegistry {
    clients: BTreeMap<String, Arc<dyn RegistrarClient>>,
}

impl RegistrarRegistry {
    pub fn from_configs(
        configs: &[ProviderConfig],
        options: &TransportOptions,
        simulate: bool,
    ) -> Result<Self, FactoryError> {
        let mut registry = Self::default();
        for config in configs {
            if registry.clients.contains_key(&config.name) {
                return Err(FactoryError::DuplicateName(config.name.clone()));
            }
            let client = build_registrar(config, options, simulate)?;
            registry.clients.insert(config.name.clone(), client);
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RegistrarClient>> {
        self.clients.get(name).cloned()
    }

    /// The only client, when exactly one is configured.
    pub fn sole(&self) -> Option<Arc<dyn RegistrarClient>> {
        if self.clients.len() == 1 {
            self.clients.values().next().cloned()
        } else {
            None
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
