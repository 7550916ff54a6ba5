//! Standard tags stamped on every created resource
//!
//! Tagging enables discovery of a session's resources after the fact, which
//! is the only recovery path when a session dies during the confirmation
//! pause.
//!
//! | Tag key             | Value                         |
//! |---------------------|-------------------------------|
//! | `Name`              | `<prefix>-<logical name>`     |
//! | `vpclab:tool`       | `vpclab`                      |
//! | `vpclab:session-id` | unique id per session         |
//! | `vpclab:created-at` | RFC 3339 creation timestamp   |

pub const TAG_TOOL: &str = "vpclab:tool";
pub const TAG_TOOL_VALUE: &str = "vpclab";
pub const TAG_SESSION_ID: &str = "vpclab:session-id";
pub const TAG_CREATED_AT: &str = "vpclab:created-at";

/// Build an EC2 TagSpecification carrying the standard tags plus `Name`.
pub fn ec2_tag_spec(
    resource_type: aws_sdk_ec2::types::ResourceType,
    session_id: &str,
    name: &str,
) -> aws_sdk_ec2::types::TagSpecification {
    use aws_sdk_ec2::types::{Tag, TagSpecification};

    let created_at = chrono::Utc::now().to_rfc3339();
    TagSpecification::builder()
        .resource_type(resource_type)
        .tags(Tag::builder().key("Name").value(name).build())
        .tags(Tag::builder().key(TAG_TOOL).value(TAG_TOOL_VALUE).build())
        .tags(Tag::builder().key(TAG_SESSION_ID).value(session_id).build())
        .tags(
            Tag::builder()
                .key(TAG_CREATED_AT)
                .value(&created_at)
                .build(),
        )
        .build()
}

/// The same tag set for ELBv2 resources.
pub fn elb_tags(
    session_id: &str,
    name: &str,
) -> anyhow::Result<Vec<aws_sdk_elasticloadbalancingv2::types::Tag>> {
    use aws_sdk_elasticloadbalancingv2::types::Tag;

    let created_at = chrono::Utc::now().to_rfc3339();
    Ok(vec![
        Tag::builder().key("Name").value(name).build()?,
        Tag::builder().key(TAG_TOOL).value(TAG_TOOL_VALUE).build()?,
        Tag::builder().key(TAG_SESSION_ID).value(session_id).build()?,
        Tag::builder().key(TAG_CREATED_AT).value(created_at).build()?,
    ])
}
