pub mod instance_spec;
pub mod instance_status;
pub mod lookup_entry;
pub mod observed_instance;
pub mod operation;
pub mod provider_instance;
pub mod service_account_key;
pub mod source_image;
pub mod user_data;

pub use instance_spec::{
    AttachedDiskSpec, CreateInstanceRequest, DiskSpec, DnsRecordSpec, NetworkInterfaceSpec,
    OneToOneNatSpec, PrimaryAddressSpec, ResourcesSpec, SchedulingPolicy,
};
pub use instance_status::InstanceStatus;
pub use lookup_entry::LookupEntry;
pub use observed_instance::ObservedInstance;
pub use operation::{Operation, OperationError};
pub use provider_instance::{NetworkInterface, OneToOneNat, PrimaryAddress, ProviderInstance};
pub use service_account_key::ServiceAccountKey;
pub use source_image::SourceImage;
pub use user_data::AgentUserData;
