use gopad_document::Op;
use prototk_derive::Message;
use rpc_pb::service;

/// `Server.Init{client,session} -> {doc,err}`.
#[derive(Clone, Debug, Default, Message)]
pub struct InitRequest {
    #[prototk(1, int32)]
    pub client: i32,
    #[prototk(2, uint32)]
    pub session: u32,
}

#[derive(Clone, Debug, Default, Message)]
pub struct InitReply {
    #[prototk(1, bytes)]
    pub doc: Vec<u8>,
    #[prototk(2, string)]
    pub err: String,
}

/// `Server.Handle{ops,xid} -> {err}`.
#[derive(Clone, Debug, Default, Message)]
pub struct HandleRequest {
    #[prototk(1, message)]
    pub ops: Vec<Op>,
    #[prototk(2, uint64)]
    pub xid: u64,
}

#[derive(Clone, Debug, Default, Message)]
pub struct HandleReply {
    #[prototk(1, string)]
    pub err: String,
}

/// `Server.Query{view,client} -> {ops,err}`.
#[derive(Clone, Debug, Default, Message)]
pub struct QueryRequest {
    #[prototk(1, uint32)]
    pub view: u32,
    #[prototk(2, int32)]
    pub client: i32,
}

#[derive(Clone, Debug, Default, Message)]
pub struct QueryReply {
    #[prototk(1, message)]
    pub ops: Vec<Op>,
    #[prototk(2, string)]
    pub err: String,
}

/// `Server.Copy{} -> {srv,px,doc,err}`.
#[derive(Clone, Debug, Default, Message)]
pub struct CopyRequest {}

#[derive(Clone, Debug, Default, Message)]
pub struct CopyReply {
    #[prototk(1, bytes)]
    pub srv: Vec<u8>,
    #[prototk(2, bytes)]
    pub px: Vec<u8>,
    #[prototk(3, bytes)]
    pub doc: Vec<u8>,
    #[prototk(4, string)]
    pub err: String,
}

service! {
    name = ServerService;
    server = ServerServer;
    client = ServerClient;
    error = crate::error::Error;
    rpc init(InitRequest) -> InitReply;
    rpc handle(HandleRequest) -> HandleReply;
    rpc query(QueryRequest) -> QueryReply;
    rpc copy(CopyRequest) -> CopyReply;
}
