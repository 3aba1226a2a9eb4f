// Messaging between the render thread and its callers

pub mod channels;
pub mod notification;
