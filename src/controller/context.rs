//! Shared controller context and actuator construction

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client, ResourceExt};

use crate::actuator::cloud::{CloudActuator, CloudConfig};
use crate::actuator::gateway::{GatewayActuator, GatewayConfig};
use crate::actuator::RemoteActuator;
use crate::config::OperatorConfig;
use crate::controller::engine::{EngineSettings, Reconciler};
use crate::controller::error::{Error, Result};
use crate::crd::{AutonomousDatabase, ContainerDatabase, PluggableDatabase, SecretKeyRef};
use crate::health::HealthState;
use crate::resources::secret::read_key;

/// Actuator resolved for one resource, plus defaults from its credentials
pub struct Backend {
    pub actuator: Box<dyn RemoteActuator>,
    /// Compartment to use when the spec does not name one
    pub default_compartment: Option<String>,
}

/// Builds the actuator a resource talks to
#[async_trait]
pub trait ActuatorFactory: Send + Sync {
    async fn for_adb(&self, adb: &AutonomousDatabase) -> Result<Backend>;

    async fn for_pdb(&self, pdb: &PluggableDatabase) -> Result<Backend>;
}

/// Resolves credentials from ConfigMaps, Secrets and ContainerDatabase resources
pub struct KubeActuatorFactory {
    client: Client,
    timeout: Duration,
}

impl KubeActuatorFactory {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<String> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("secret {}/{}", namespace, name)))?;
        read_key(&secret, key).ok_or_else(|| {
            Error::NotFound(format!("key {} in secret {}/{}", key, namespace, name))
        })
    }

    async fn secret_ref(&self, namespace: &str, r: &SecretKeyRef) -> Result<String> {
        self.secret_value(namespace, &r.name, &r.key).await
    }
}

#[async_trait]
impl ActuatorFactory for KubeActuatorFactory {
    async fn for_adb(&self, adb: &AutonomousDatabase) -> Result<Backend> {
        let namespace = adb
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let oci = &adb.spec.oci_config;

        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        let config_map = config_maps.get_opt(&oci.config_map_name).await?.ok_or_else(|| {
            Error::NotFound(format!("configmap {}/{}", namespace, oci.config_map_name))
        })?;
        let data = config_map.data.unwrap_or_default();

        let endpoint = match (data.get("endpoint"), data.get("region")) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(region)) => CloudConfig::regional_endpoint(region),
            (None, None) => {
                return Err(Error::InvalidConfig(format!(
                    "configmap {} must set region or endpoint",
                    oci.config_map_name
                )));
            }
        };
        let token = self
            .secret_value(&namespace, &oci.secret_name, "token")
            .await?;

        let actuator = CloudActuator::new(CloudConfig {
            endpoint,
            token,
            timeout: self.timeout,
        })?;
        Ok(Backend {
            actuator: Box::new(actuator),
            default_compartment: data.get("compartment").cloned(),
        })
    }

    async fn for_pdb(&self, pdb: &PluggableDatabase) -> Result<Backend> {
        let namespace = pdb
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let cdbs: Api<ContainerDatabase> = Api::namespaced(self.client.clone(), &namespace);
        let cdb = cdbs.get_opt(&pdb.spec.cdb_ref).await?.ok_or_else(|| {
            Error::NotFound(format!("containerdatabase {}/{}", namespace, pdb.spec.cdb_ref))
        })?;
        let spec = &cdb.spec;

        let user = self.secret_ref(&namespace, &spec.admin_user).await?;
        let password = self.secret_ref(&namespace, &spec.admin_password).await?;

        let (client_key_pem, client_cert_pem, ca_pem) = match &spec.tls {
            Some(tls) => {
                let key = self.secret_ref(&namespace, &tls.key).await?;
                let cert = self.secret_ref(&namespace, &tls.cert).await?;
                let ca = match &tls.ca {
                    Some(ca) => Some(self.secret_ref(&namespace, ca).await?.into_bytes()),
                    None => None,
                };
                (Some(key.into_bytes()), Some(cert.into_bytes()), ca)
            }
            None => (None, None, None),
        };

        let actuator = GatewayActuator::new(GatewayConfig {
            base_url: spec.gateway_url.clone(),
            user,
            password,
            client_key_pem,
            client_cert_pem,
            ca_pem,
            drop_action: pdb.spec.drop_action,
            timeout: self.timeout,
        })?;
        Ok(Backend {
            actuator: Box::new(actuator),
            default_compartment: None,
        })
    }
}

/// Shared context for both controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    pub config: OperatorConfig,
    pub actuators: Arc<dyn ActuatorFactory>,
    pub reconciler: Reconciler,
    /// Health state for recording metrics
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    pub fn new(
        client: Client,
        config: OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let actuators = Arc::new(KubeActuatorFactory::new(
            client.clone(),
            config.remote_call_timeout,
        ));
        Self::with_actuators(client, config, actuators, health_state)
    }

    /// Use a custom actuator factory
    pub fn with_actuators(
        client: Client,
        config: OperatorConfig,
        actuators: Arc<dyn ActuatorFactory>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let reconciler = Reconciler::new(EngineSettings::from(&config));
        Self {
            client,
            config,
            actuators,
            reconciler,
            health_state,
        }
    }
}
