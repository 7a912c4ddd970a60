pub mod action;
pub mod channel;
pub mod errors;
pub mod fragment;
pub mod fulfillment;
pub mod identity;
pub mod ids;
pub mod message;

pub use action::Action;
pub use channel::{SendChannel, SendReceipt, SenderAction};
pub use errors::{ChannelError, FulfillmentError, IdentityError};
pub use fragment::{
    BatchUnit, ButtonTarget, Card, CardButton, Carousel, Fragment, FragmentKind, QuickReply,
};
pub use fulfillment::{Fulfillment, FulfillmentEngine, ParamValue, Parameters};
pub use identity::{IdentityProvider, Profile, SubscriberDirectory};
pub use ids::{SenderId, SessionId};
pub use message::OutboundMessage;
