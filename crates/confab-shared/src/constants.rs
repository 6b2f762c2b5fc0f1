/// Application name
pub const APP_NAME: &str = "confab";

/// Default capacity of the session command channel
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Default capacity of the daemon event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default capacity of each broadcast topic
pub const DEFAULT_BUS_CAPACITY: usize = 128;

/// Messages requested per history page
pub const DEFAULT_LOAD_COUNT: u32 = 32;

/// Messages requested for the first page after a conversation becomes ready
pub const DEFAULT_READY_LOAD_COUNT: u32 = 8;

/// Messages requested for the follow-up page after a conversation becomes ready
pub const READY_FOLLOWUP_LOAD_COUNT: u32 = 2;

// Call detail keys
pub const CALL_KEY_ACCOUNT_ID: &str = "ACCOUNTID";
pub const CALL_KEY_CALL_TYPE: &str = "CALL_TYPE";
pub const CALL_KEY_CALL_STATE: &str = "CALL_STATE";
pub const CALL_KEY_PEER_NUMBER: &str = "PEER_NUMBER";
pub const CALL_KEY_PEER_HOLDING: &str = "PEER_HOLDING";
pub const CALL_KEY_AUDIO_MUTED: &str = "AUDIO_MUTED";
pub const CALL_KEY_VIDEO_MUTED: &str = "VIDEO_MUTED";
pub const CALL_KEY_AUDIO_CODEC: &str = "AUDIO_CODEC";
pub const CALL_KEY_VIDEO_CODEC: &str = "VIDEO_CODEC";
pub const CALL_KEY_CONF_ID: &str = "CONF_ID";

// Media keys
pub const MEDIA_KEY_TYPE: &str = "MEDIA_TYPE";
pub const MEDIA_KEY_LABEL: &str = "LABEL";
pub const MEDIA_KEY_ENABLED: &str = "ENABLED";
pub const MEDIA_KEY_MUTED: &str = "MUTED";
pub const MEDIA_KEY_SOURCE: &str = "SOURCE";
pub const MEDIA_TYPE_AUDIO: &str = "MEDIA_TYPE_AUDIO";
pub const MEDIA_TYPE_VIDEO: &str = "MEDIA_TYPE_VIDEO";

/// Video source used when sharing the screen
pub const SCREEN_SHARE_SOURCE: &str = "camera://desktop";

// Swarm message keys
pub const MSG_KEY_ID: &str = "id";
pub const MSG_KEY_TYPE: &str = "type";
pub const MSG_KEY_AUTHOR: &str = "author";
pub const MSG_KEY_PARENT: &str = "linearizedParent";
pub const MSG_KEY_TIMESTAMP: &str = "timestamp";
pub const MSG_KEY_BODY: &str = "body";
pub const MSG_KEY_REPLY_TO: &str = "reply-to";
pub const MSG_KEY_REACT_TO: &str = "react-to";
pub const MSG_KEY_EDIT: &str = "edit";
pub const MSG_KEY_ACTION: &str = "action";
pub const MSG_KEY_URI: &str = "uri";
pub const MSG_KEY_INVITED: &str = "invited";
pub const MSG_KEY_DISPLAY_NAME: &str = "displayName";
pub const MSG_KEY_FILE_ID: &str = "fileId";
pub const MSG_KEY_TOTAL_SIZE: &str = "totalSize";
pub const MSG_KEY_DURATION: &str = "duration";
pub const MSG_KEY_CONF_ID: &str = "confId";
pub const MSG_KEY_DEVICE: &str = "device";

// Swarm message types
pub const MSG_TYPE_INITIAL: &str = "initial";
pub const MSG_TYPE_MEMBER: &str = "member";
pub const MSG_TYPE_TEXT: &str = "text/plain";
pub const MSG_TYPE_EDITED: &str = "application/edited-message";
pub const MSG_TYPE_DATA_TRANSFER: &str = "application/data-transfer+json";
pub const MSG_TYPE_CALL_HISTORY: &str = "application/call-history+json";
pub const MSG_TYPE_PROFILE: &str = "application/update-profile";
pub const MSG_TYPE_MERGE: &str = "merge";

// Conversation info keys
pub const CONV_KEY_MODE: &str = "mode";
pub const CONV_KEY_TITLE: &str = "title";
pub const CONV_KEY_DESCRIPTION: &str = "description";
pub const CONV_KEY_AVATAR: &str = "avatar";
pub const CONV_KEY_MEMBER_URI: &str = "uri";
pub const CONV_KEY_MEMBER_ROLE: &str = "role";
pub const CONV_KEY_LAST_DISPLAYED: &str = "lastDisplayed";

// Conference participant info keys
pub const CONF_KEY_URI: &str = "uri";
pub const CONF_KEY_DEVICE: &str = "device";
pub const CONF_KEY_SINK: &str = "sinkId";
pub const CONF_KEY_ACTIVE: &str = "active";
pub const CONF_KEY_VIDEO_MUTED: &str = "videoMuted";
pub const CONF_KEY_AUDIO_LOCAL_MUTED: &str = "audioLocalMuted";
pub const CONF_KEY_AUDIO_MODERATOR_MUTED: &str = "audioModeratorMuted";
pub const CONF_KEY_IS_MODERATOR: &str = "isModerator";
pub const CONF_KEY_HAND_RAISED: &str = "handRaised";
pub const CONF_KEY_RECORDING: &str = "recording";
pub const CONF_KEY_VOICE_ACTIVITY: &str = "voiceActivity";
pub const CONF_KEY_X: &str = "x";
pub const CONF_KEY_Y: &str = "y";
pub const CONF_KEY_WIDTH: &str = "w";
pub const CONF_KEY_HEIGHT: &str = "h";
