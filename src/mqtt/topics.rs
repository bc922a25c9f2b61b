use crate::config::MqttChannel;

impl MqttChannel {
    /// Last topic segment for this channel
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quota => "quota",
            Self::Status => "status",
            Self::Set => "set",
            Self::SetReply => "set_reply",
            Self::Get => "get",
            Self::GetReply => "get_reply",
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::Quota,
            Self::Status,
            Self::Set,
            Self::SetReply,
            Self::Get,
            Self::GetReply,
        ]
    }
}

/// `/open/<account>/<serial>/<channel>`
pub fn topic_for(account: &str, serial: &str, channel: MqttChannel) -> String {
    format!("/open/{}/{}/{}", account, serial, channel.as_str())
}

/// Topics subscribed for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    prefix: String,
    topics: Vec<(MqttChannel, String)>,
}

impl TopicSet {
    pub fn new(account: &str, serial: &str, channels: &[MqttChannel]) -> Self {
        let mut topics: Vec<(MqttChannel, String)> = Vec::with_capacity(channels.len());
        for &channel in channels {
            if !topics.iter().any(|(c, _)| *c == channel) {
                topics.push((channel, topic_for(account, serial, channel)));
            }
        }
        Self {
            prefix: format!("/open/{}/{}/", account, serial),
            topics,
        }
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|(_, t)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Channel a received topic belongs to, if it is one of ours
    pub fn channel_of(&self, topic: &str) -> Option<MqttChannel> {
        let suffix = topic.strip_prefix(&self.prefix)?;
        self.topics
            .iter()
            .map(|(c, _)| *c)
            .find(|c| c.as_str() == suffix)
    }
}
