//! VM creation command

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use log::{info, warn};

use pve_vm_apply::{ProvisionReport, Provisioner};
use pve_vm_core::{HypervisorClient, KeyStore, ProvisionError, ValidationError};
use pve_vm_host::{DryRunClient, QmClient, ResourceDiscovery};
use pve_vm_image::{HttpImageFetcher, ImageCache, ImageManager};
use pve_vm_keys::FsKeyStore;
use pve_vm_types::{
    HostCapabilities, NetworkConfig, NetworkMode, SshKeyRecord, SupportedOsImage, VmRequest,
    SUPPORTED_OS_IMAGES,
};
use pve_vm_validate::{FieldValidator, HostValidator, RequestValidator};

use crate::config::ProvisionConfig;
use crate::prompt::{resolve, DialoguerPrompter, Field, NonInteractivePrompter, Prompter};

/// Parameters of the VM to create
#[derive(Debug, Clone, Default, Args)]
pub struct CreateArgs {
    /// VM id (100-999, must be unused)
    #[arg(long)]
    pub id: Option<String>,

    /// VM name (must be unused)
    #[arg(long)]
    pub name: Option<String>,

    /// Memory in GB, decimals allowed
    #[arg(long)]
    pub ram: Option<String>,

    /// Number of CPU cores
    #[arg(long)]
    pub cores: Option<String>,

    /// Disk size in GB, decimals allowed
    #[arg(long)]
    pub disk_size: Option<String>,

    /// Storage for the disk and the cloud-init drive
    #[arg(long)]
    pub storage: Option<String>,

    /// Cloud-init user
    #[arg(long)]
    pub user: Option<String>,

    /// Cloud-init password
    #[arg(long = "pass")]
    pub password: Option<String>,

    /// Upgrade packages on first boot
    #[arg(long)]
    pub upgrade_packages: bool,

    /// Ubuntu release codename (e.g. noble)
    #[arg(long)]
    pub ubuntu_version: Option<String>,

    /// Generate a new SSH key for the VM
    #[arg(long)]
    pub new_ssh_key: bool,

    /// Name of the SSH key to generate
    #[arg(long)]
    pub new_ssh_key_name: Option<String>,

    /// Name of an existing SSH key
    #[arg(long)]
    pub use_ssh_key: Option<String>,

    /// Configure the network with DHCP
    #[arg(long)]
    pub dhcp: bool,

    /// Static IPv4 address (/24)
    #[arg(long)]
    pub ip: Option<String>,

    /// Gateway for the static address
    #[arg(long)]
    pub gateway_ip: Option<String>,

    /// Space separated nameservers
    #[arg(long)]
    pub dns_servers: Option<String>,

    /// Never prompt, fail on the first missing or invalid value
    #[arg(long)]
    pub non_interactive: bool,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Print the hypervisor commands instead of running them
    #[arg(long)]
    pub dry_run: bool,

    /// Leave a half-built VM in place when a step fails
    #[arg(long)]
    pub keep_on_failure: bool,
}

/// Resolved inputs of one run
struct Collected {
    request: VmRequest,
    image: &'static SupportedOsImage,
    key: SshKeyRecord,
}

/// Create command implementation
pub struct CreateCommand {
    client: Arc<dyn HypervisorClient>,
    key_store: Arc<dyn KeyStore>,
    images: Arc<dyn ImageCache>,
    prompter: Box<dyn Prompter>,
    config: ProvisionConfig,
    fields: FieldValidator,
}

impl CreateCommand {
    pub fn new(
        client: Arc<dyn HypervisorClient>,
        key_store: Arc<dyn KeyStore>,
        images: Arc<dyn ImageCache>,
        prompter: Box<dyn Prompter>,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            client,
            key_store,
            images,
            prompter,
            config,
            fields: FieldValidator::new(),
        }
    }

    /// Wire up the real host tools according to `config`
    pub fn from_config(config: ProvisionConfig, args: &CreateArgs) -> Result<Self> {
        let qm = Arc::new(
            QmClient::with_config(&config.qm_path, &config.pvesh_path, config.command_timeout())
                .with_hostname_path(&config.hostname_path),
        );
        let client: Arc<dyn HypervisorClient> = if args.dry_run {
            Arc::new(DryRunClient::new(qm))
        } else {
            qm
        };

        let key_store = Arc::new(FsKeyStore::with_keygen(
            &config.key_store_dir,
            &config.ssh_keygen_path,
        ));
        let fetcher = HttpImageFetcher::new(config.download_connect_timeout())
            .context("Failed to set up image downloads")?;
        let images = Arc::new(ImageManager::new(
            &config.image_cache_dir,
            Arc::new(fetcher),
        ));

        let prompter: Box<dyn Prompter> =
            if args.non_interactive || !std::io::stdin().is_terminal() {
                info!("Running non-interactively");
                Box::new(NonInteractivePrompter)
            } else {
                Box::new(DialoguerPrompter)
            };

        Ok(Self::new(client, key_store, images, prompter, config))
    }

    /// Execute create command
    pub async fn execute(&self, args: &CreateArgs) -> Result<ProvisionReport> {
        let capabilities = ResourceDiscovery::new(self.client.clone())
            .discover()
            .await
            .context("Failed to discover host resources")?;

        let validator = HostValidator::new(
            self.client.clone(),
            self.key_store.clone(),
            capabilities.clone(),
        );
        let collected = self.collect(args, &validator).await?;
        let request = &collected.request;

        // VM ids and names may have been taken while the operator was typing
        let snapshot = HostCapabilities {
            vms: self
                .client
                .list_vms()
                .await
                .context("Failed to refresh the VM list")?,
            ..capabilities
        };
        RequestValidator::new()
            .validate_request(request, &snapshot, self.key_store.as_ref())
            .map_err(ProvisionError::from)?;

        println!("{}", render_summary(&collected, &snapshot.node));
        if !self.confirm(args).await? {
            bail!("VM creation cancelled");
        }

        let image_path = self
            .images
            .ensure_image_cached(&request.os_codename)
            .await?;

        let provisioner = Provisioner::new(
            self.client.clone(),
            self.config.provision_settings(args.keep_on_failure),
        );
        let report = match provisioner
            .provision(request, &image_path, &collected.key.public_key_path())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                if let ProvisionError::Aborted {
                    completed,
                    rolled_back,
                    ..
                } = &e
                {
                    eprintln!("Completed steps: {}", completed.join(", "));
                    if !rolled_back && !completed.is_empty() {
                        eprintln!(
                            "VM {} was left in place; remove it with 'qm destroy {} --purge'",
                            request.id, request.id
                        );
                    }
                }
                return Err(e.into());
            }
        };

        println!("{}", render_report(&collected, &report, args.dry_run));
        Ok(report)
    }

    async fn collect(&self, args: &CreateArgs, validator: &HostValidator) -> Result<Collected> {
        let prompter = self.prompter.as_ref();
        let fields = validator.fields();
        let host = validator.capabilities();

        let mut id_field = Field::new("id", "VM id", args.id.as_deref());
        if let Some(free) = host.next_free_vmid() {
            id_field = id_field.with_default(free.to_string());
        }
        let id = resolve(prompter, id_field, move |raw: String| async move {
            validator.check_id(&raw).await
        })
        .await?;

        let name = resolve(
            prompter,
            Field::new("name", "VM name", args.name.as_deref()),
            move |raw: String| async move { validator.check_name(&raw).await },
        )
        .await?;

        let ram_label = format!("Memory in GB (max {})", host.max_ram_gb);
        let ram_gb = resolve(
            prompter,
            Field::new("ram", &ram_label, args.ram.as_deref()),
            move |raw: String| async move { validator.check_ram(&raw) },
        )
        .await?;

        let cores_label = format!("CPU cores (max {})", host.max_cores);
        let cores = resolve(
            prompter,
            Field::new("cores", &cores_label, args.cores.as_deref()),
            move |raw: String| async move { validator.check_cores(&raw) },
        )
        .await?;

        let disk_size_gb = resolve(
            prompter,
            Field::new("disk-size", "Disk size in GB", args.disk_size.as_deref()),
            move |raw: String| async move { checked(fields.validate_disk_size(&raw)) },
        )
        .await?;

        let storage_label = format!("Storage ({})", host.storages.join(", "));
        let storage = resolve(
            prompter,
            Field::new("storage", &storage_label, args.storage.as_deref()),
            move |raw: String| async move { validator.check_storage(&raw) },
        )
        .await?;

        let user = resolve(
            prompter,
            Field::new("user", "Cloud-init user", args.user.as_deref()),
            move |raw: String| async move { checked(fields.validate_user(&raw)) },
        )
        .await?;

        let password = resolve(
            prompter,
            Field::new("pass", "Cloud-init password", args.password.as_deref()).secret(),
            move |raw: String| async move { checked(non_empty_password(raw)) },
        )
        .await?;

        let upgrade_packages = if args.upgrade_packages {
            true
        } else if prompter.interactive() {
            self.ask_yes_no("Upgrade packages on first boot? (y/n)", "n")
                .await?
        } else {
            false
        };

        let os_label = format!(
            "Ubuntu release codename ({})",
            SupportedOsImage::codenames().join(", ")
        );
        let image = resolve(
            prompter,
            Field::new("ubuntu-version", &os_label, args.ubuntu_version.as_deref())
                .with_default(SUPPORTED_OS_IMAGES[0].codename),
            move |raw: String| async move { validator.check_os_codename(&raw) },
        )
        .await?;

        let key = self.resolve_key(args, validator).await?;
        let network = self.resolve_network(args, validator).await?;

        let request = VmRequest {
            id,
            name,
            ram_gb,
            cores,
            disk_size_gb,
            storage,
            user,
            password,
            upgrade_packages,
            os_codename: image.codename.to_string(),
            ssh_key_name: key.name.clone(),
            network,
        };
        Ok(Collected {
            request,
            image,
            key,
        })
    }

    async fn resolve_key(&self, args: &CreateArgs, validator: &HostValidator) -> Result<SshKeyRecord> {
        let prompter = self.prompter.as_ref();
        let wants_new = args.new_ssh_key || args.new_ssh_key_name.is_some();

        if let (Some(name), false) = (args.use_ssh_key.as_deref(), wants_new) {
            return resolve(
                prompter,
                Field::new("use-ssh-key", "Existing SSH key name", Some(name)),
                move |raw: String| async move { validator.check_existing_key(&raw) },
            )
            .await;
        }
        if args.use_ssh_key.is_some() {
            warn!("Both --use-ssh-key and --new-ssh-key given, generating a new key");
        }

        if !wants_new {
            if !prompter.interactive() {
                bail!("--use-ssh-key or --new-ssh-key is required in non-interactive mode");
            }
            let available = self
                .key_store
                .list_available_keys()
                .context("Failed to read SSH key store")?;
            if available.is_empty() {
                println!("No SSH keys found, a new key will be generated.");
            } else if !self
                .ask_yes_no("Generate a new SSH key? (y/n)", "n")
                .await?
            {
                let names: Vec<String> = available.iter().map(|key| key.name.clone()).collect();
                let index = prompter.choose("SSH key", &names)?;
                return available
                    .into_iter()
                    .nth(index)
                    .context("Selected SSH key no longer exists");
            }
        }

        let name = resolve(
            prompter,
            Field::new(
                "new-ssh-key-name",
                "Name for the new SSH key",
                args.new_ssh_key_name.as_deref(),
            ),
            move |raw: String| async move { validator.check_new_key(&raw) },
        )
        .await?;

        let record = self.key_store.generate_key(&name).await?;
        println!(
            "Generated SSH key '{}' ({})",
            record.name,
            record.public_key_path().display()
        );
        Ok(record)
    }

    async fn resolve_network(
        &self,
        args: &CreateArgs,
        validator: &HostValidator,
    ) -> Result<NetworkConfig> {
        let prompter = self.prompter.as_ref();
        let fields = validator.fields();
        let wants_static = args.ip.is_some() || args.gateway_ip.is_some();

        if args.dhcp && wants_static {
            warn!("--dhcp given together with --ip/--gateway-ip, using DHCP");
        }

        let dhcp = if args.dhcp {
            true
        } else if wants_static {
            false
        } else if prompter.interactive() {
            self.ask_yes_no("Use DHCP? (y/n)", "y").await?
        } else {
            true
        };

        let mode = if dhcp {
            NetworkMode::Dhcp
        } else {
            let ip = resolve(
                prompter,
                Field::new("ip", "IPv4 address (/24)", args.ip.as_deref()),
                move |raw: String| async move { checked(fields.validate_ip(&raw)) },
            )
            .await?;
            let gateway_ip = resolve(
                prompter,
                Field::new("gateway-ip", "Gateway IPv4 address", args.gateway_ip.as_deref()),
                move |raw: String| async move { checked(fields.validate_ip(&raw)) },
            )
            .await?;
            NetworkMode::Static { ip, gateway_ip }
        };

        let configured = self.config.default_dns_servers.join(" ");
        let mut dns_value = args.dns_servers.clone();
        if dns_value.is_none() && !prompter.interactive() && !configured.is_empty() {
            dns_value = Some(configured.clone());
        }
        let mut dns_field = Field::new(
            "dns-servers",
            "DNS servers (space separated)",
            dns_value.as_deref(),
        );
        if !configured.is_empty() {
            dns_field = dns_field.with_default(configured);
        }
        let dns_servers = resolve(prompter, dns_field, move |raw: String| async move {
            checked(fields.validate_dns_servers(&raw))
        })
        .await?;

        Ok(NetworkConfig { mode, dns_servers })
    }

    /// Interactive y/n question
    async fn ask_yes_no(&self, label: &str, default: &str) -> Result<bool> {
        let fields = &self.fields;
        resolve(
            self.prompter.as_ref(),
            Field::new("yes", label, None).with_default(default),
            move |raw: String| async move { checked(fields.validate_yes_no(&raw)) },
        )
        .await
    }

    async fn confirm(&self, args: &CreateArgs) -> Result<bool> {
        if args.yes {
            return Ok(true);
        }
        if !self.prompter.interactive() {
            info!("Non-interactive run, skipping confirmation");
            return Ok(true);
        }
        self.ask_yes_no("Create this VM? (y/n)", "n").await
    }
}

fn render_summary(collected: &Collected, node: &str) -> String {
    let request = &collected.request;
    let mut out = String::from("\nVM configuration:\n");
    let mut line = |label: &str, value: String| {
        out.push_str(&format!("  {:<18} {}\n", label, value));
    };

    line("Node", node.to_string());
    line("VM id", request.id.to_string());
    line("Name", request.name.clone());
    line("Memory", format!("{} GB ({} MB)", request.ram_gb, request.memory_mb()));
    line("Cores", request.cores.to_string());
    line("Disk", format!("{} on {}", request.disk_size_arg(), request.storage));
    line(
        "OS image",
        format!(
            "Ubuntu {} ({})",
            collected.image.version, collected.image.codename
        ),
    );
    line("User", request.user.clone());
    line("SSH key", collected.key.public_key_path().display().to_string());
    line("Upgrade packages", if request.upgrade_packages { "yes" } else { "no" }.to_string());
    line("Network", request.network.mode.to_string());
    line("DNS servers", request.network.nameserver_arg());
    out
}

fn render_report(collected: &Collected, report: &ProvisionReport, dry_run: bool) -> String {
    let request = &collected.request;
    let mut out = String::new();
    if dry_run {
        out.push_str(&format!(
            "Dry run complete, no changes were made to VM {}\n",
            report.vmid
        ));
    } else {
        out.push_str(&format!(
            "VM {} ({}) created in {} ms\n",
            report.vmid, request.name, report.duration_ms
        ));
    }
    out.push_str(&format!("  Disk:     {}\n", report.disk));
    out.push_str(&format!("  Network:  {}\n", request.network.mode));
    out.push_str(&format!(
        "  Login:    ssh -i {} {}@<vm address>\n",
        collected.key.private_key_path().display(),
        request.user
    ));
    if let Some(journal) = &report.journal {
        out.push_str(&format!("  Journal:  {}\n", journal.display()));
    }
    out.push_str(&format!("Start it with: qm start {}\n", report.vmid));
    out
}

fn checked<T>(result: std::result::Result<T, ValidationError>) -> pve_vm_core::Result<T> {
    result.map_err(ProvisionError::from)
}

fn non_empty_password(raw: String) -> std::result::Result<String, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::Empty { field: "Password" });
    }
    Ok(raw)
}
