//! Live EC2 implementation of the provider contract.
//!
//! Credentials come from the standard AWS chain: a named profile in
//! `~/.aws/config` / `~/.aws/credentials` when one is configured, the
//! `AWS_*` environment variables otherwise. Each configured region gets
//! its own client; connection is fail-fast, so a credential rejection for
//! any region aborts the whole invocation.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::types::AttributeValue;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::directory::ResourceDirectory;
use crate::provider::{Compute, ProviderError, ProviderFuture, Server, ServerState, Snapshot, Tags};

/// Errors raised while establishing region handles.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConnectError {
    /// The provider rejected the credentials or was unreachable.
    #[error("failed to connect to region {region}: {message}")]
    Rejected {
        /// Region whose connection attempt failed.
        region: String,
        /// Provider diagnostic.
        message: String,
    },
}

fn api_error<E>(err: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::api(DisplayErrorContext(err).to_string())
}

fn is_not_found<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.meta()
        .code()
        .is_some_and(|code| code.contains("NotFound"))
}

fn map_instance(instance: &aws_sdk_ec2::types::Instance) -> Server {
    let tags = Tags::from_pairs(instance.tags().iter().filter_map(|tag| {
        let key = tag.key()?.to_owned();
        let value = tag.value()?.to_owned();
        Some((key, value))
    }));
    Server {
        id: instance.instance_id().unwrap_or_default().to_owned(),
        tags,
        state: instance.state().and_then(|state| state.name()).map_or_else(
            || ServerState::Other(String::from("unknown")),
            |name| ServerState::from_label(name.as_str()),
        ),
        flavor: instance
            .instance_type()
            .map(|flavor| flavor.as_str().to_owned())
            .unwrap_or_default(),
        availability_zone: instance
            .placement()
            .and_then(|placement| placement.availability_zone())
            .unwrap_or_default()
            .to_owned(),
        public_ip: instance
            .public_ip_address()
            .filter(|address| !address.is_empty())
            .map(str::to_owned),
        dns_name: instance
            .public_dns_name()
            .filter(|name| !name.is_empty())
            .map(str::to_owned),
    }
}

fn map_snapshot(snapshot: &aws_sdk_ec2::types::Snapshot) -> Snapshot {
    let created_at = snapshot
        .start_time()
        .and_then(|time| DateTime::from_timestamp(time.secs(), time.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Snapshot {
        id: snapshot.snapshot_id().unwrap_or_default().to_owned(),
        description: snapshot
            .description()
            .filter(|description| !description.is_empty())
            .map(str::to_owned),
        created_at,
        volume_size_gib: snapshot.volume_size().unwrap_or(0).into(),
    }
}

/// One EC2 client bound to a single region.
#[derive(Clone, Debug)]
pub struct Ec2Compute {
    region: String,
    client: Client,
}

impl Ec2Compute {
    /// Connects to one region, probing the credentials with a cheap
    /// `DescribeRegions` call so a bad profile fails here rather than
    /// halfway through an operation.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Rejected`] when the probe fails.
    pub async fn connect(region: &str, profile: Option<&str>) -> Result<Self, ConnectError> {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_owned()));
        if let Some(profile_name) = profile {
            loader = loader.profile_name(profile_name);
        }
        let shared = loader.load().await;
        let client = Client::new(&shared);

        client
            .describe_regions()
            .send()
            .await
            .map_err(|err| ConnectError::Rejected {
                region: region.to_owned(),
                message: DisplayErrorContext(err).to_string(),
            })?;
        tracing::info!(region, "connected");

        Ok(Self {
            region: region.to_owned(),
            client,
        })
    }
}

/// Connects every configured region sequentially and builds the directory.
/// Any single failure is fatal: downstream operations assume every
/// configured region is queryable.
///
/// # Errors
///
/// Returns [`ConnectError`] from the first region whose probe fails.
pub async fn connect_directory(
    regions: &[String],
    profile: Option<&str>,
) -> Result<ResourceDirectory<Ec2Compute>, ConnectError> {
    let mut handles = Vec::with_capacity(regions.len());
    for region in regions {
        handles.push(Ec2Compute::connect(region, profile).await?);
    }
    Ok(ResourceDirectory::new(handles))
}

impl Compute for Ec2Compute {
    fn region(&self) -> &str {
        &self.region
    }

    fn list_servers(&self) -> ProviderFuture<'_, Vec<Server>> {
        Box::pin(async move {
            let mut servers = Vec::new();
            let mut pages = self.client.describe_instances().into_paginator().send();
            while let Some(page) = pages.next().await {
                let output = page.map_err(api_error)?;
                for reservation in output.reservations() {
                    servers.extend(reservation.instances().iter().map(map_instance));
                }
            }
            Ok(servers)
        })
    }

    fn list_snapshots(&self) -> ProviderFuture<'_, Vec<Snapshot>> {
        Box::pin(async move {
            let mut snapshots = Vec::new();
            let mut pages = self
                .client
                .describe_snapshots()
                .owner_ids("self")
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let output = page.map_err(api_error)?;
                snapshots.extend(output.snapshots().iter().map(map_snapshot));
            }
            snapshots.sort_by_key(|snapshot| snapshot.created_at);
            Ok(snapshots)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_snapshot()
                .snapshot_id(snapshot_id)
                .send()
                .await
                .map_err(api_error)?;
            Ok(())
        })
    }

    fn stop_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .stop_instances()
                .instance_ids(server_id)
                .send()
                .await
                .map_err(api_error)?;
            Ok(())
        })
    }

    fn start_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .start_instances()
                .instance_ids(server_id)
                .send()
                .await
                .map_err(api_error)?;
            Ok(())
        })
    }

    fn modify_flavor<'a>(&'a self, server_id: &'a str, flavor: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .modify_instance_attribute()
                .instance_id(server_id)
                .instance_type(AttributeValue::builder().value(flavor).build())
                .send()
                .await
                .map_err(api_error)?;
            Ok(())
        })
    }

    fn associate_address<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .associate_address()
                .instance_id(server_id)
                .public_ip(address)
                .send()
                .await
                .map_err(api_error)?;
            Ok(())
        })
    }

    fn poll_server<'a>(&'a self, server_id: &'a str) -> ProviderFuture<'a, Option<Server>> {
        Box::pin(async move {
            match self
                .client
                .describe_instances()
                .instance_ids(server_id)
                .send()
                .await
            {
                Ok(output) => Ok(output
                    .reservations()
                    .iter()
                    .flat_map(|reservation| reservation.instances())
                    .next()
                    .map(map_instance)),
                Err(err) if is_not_found(&err) => Ok(None),
                Err(err) => Err(api_error(err)),
            }
        })
    }

    fn list_region_names(&self) -> ProviderFuture<'_, Vec<String>> {
        Box::pin(async move {
            let output = self
                .client
                .describe_regions()
                .send()
                .await
                .map_err(api_error)?;
            Ok(output
                .regions()
                .iter()
                .filter_map(|region| region.region_name())
                .map(str::to_owned)
                .collect())
        })
    }
}
