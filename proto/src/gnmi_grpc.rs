// Client stubs for gnmi.gNMI, kept in the style emitted by the grpc codegen
// so they can be diffed against regenerated output.

#![allow(dead_code)]
#![allow(missing_docs)]
#![allow(clippy::all)]

const METHOD_G_NMI_CAPABILITIES: ::grpcio::Method<
    super::gnmi::CapabilityRequest,
    super::gnmi::CapabilityResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Unary,
    name: "/gnmi.gNMI/Capabilities",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

const METHOD_G_NMI_GET: ::grpcio::Method<super::gnmi::GetRequest, super::gnmi::GetResponse> =
    ::grpcio::Method {
        ty: ::grpcio::MethodType::Unary,
        name: "/gnmi.gNMI/Get",
        req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
        resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    };

const METHOD_G_NMI_SET: ::grpcio::Method<super::gnmi::SetRequest, super::gnmi::SetResponse> =
    ::grpcio::Method {
        ty: ::grpcio::MethodType::Unary,
        name: "/gnmi.gNMI/Set",
        req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
        resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    };

const METHOD_G_NMI_SUBSCRIBE: ::grpcio::Method<
    super::gnmi::SubscribeRequest,
    super::gnmi::SubscribeResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Duplex,
    name: "/gnmi.gNMI/Subscribe",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

#[derive(Clone)]
pub struct GNmiClient {
    client: ::grpcio::Client,
}

impl GNmiClient {
    pub fn new(channel: ::grpcio::Channel) -> Self {
        GNmiClient {
            client: ::grpcio::Client::new(channel),
        }
    }

    pub fn capabilities_opt(&self, req: &super::gnmi::CapabilityRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::gnmi::CapabilityResponse> {
        self.client.unary_call(&METHOD_G_NMI_CAPABILITIES, req, opt)
    }

    pub fn capabilities(&self, req: &super::gnmi::CapabilityRequest) -> ::grpcio::Result<super::gnmi::CapabilityResponse> {
        self.capabilities_opt(req, ::grpcio::CallOption::default())
    }

    pub fn capabilities_async_opt(&self, req: &super::gnmi::CapabilityRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::gnmi::CapabilityResponse>> {
        self.client.unary_call_async(&METHOD_G_NMI_CAPABILITIES, req, opt)
    }

    pub fn capabilities_async(&self, req: &super::gnmi::CapabilityRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::gnmi::CapabilityResponse>> {
        self.capabilities_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn get_opt(&self, req: &super::gnmi::GetRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::gnmi::GetResponse> {
        self.client.unary_call(&METHOD_G_NMI_GET, req, opt)
    }

    pub fn get(&self, req: &super::gnmi::GetRequest) -> ::grpcio::Result<super::gnmi::GetResponse> {
        self.get_opt(req, ::grpcio::CallOption::default())
    }

    pub fn get_async_opt(&self, req: &super::gnmi::GetRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::gnmi::GetResponse>> {
        self.client.unary_call_async(&METHOD_G_NMI_GET, req, opt)
    }

    pub fn get_async(&self, req: &super::gnmi::GetRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::gnmi::GetResponse>> {
        self.get_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn set_opt(&self, req: &super::gnmi::SetRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::gnmi::SetResponse> {
        self.client.unary_call(&METHOD_G_NMI_SET, req, opt)
    }

    pub fn set(&self, req: &super::gnmi::SetRequest) -> ::grpcio::Result<super::gnmi::SetResponse> {
        self.set_opt(req, ::grpcio::CallOption::default())
    }

    pub fn set_async_opt(&self, req: &super::gnmi::SetRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::gnmi::SetResponse>> {
        self.client.unary_call_async(&METHOD_G_NMI_SET, req, opt)
    }

    pub fn set_async(&self, req: &super::gnmi::SetRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::gnmi::SetResponse>> {
        self.set_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn subscribe_opt(&self, opt: ::grpcio::CallOption) -> ::grpcio::Result<(::grpcio::ClientDuplexSender<super::gnmi::SubscribeRequest>, ::grpcio::ClientDuplexReceiver<super::gnmi::SubscribeResponse>)> {
        self.client.duplex_streaming(&METHOD_G_NMI_SUBSCRIBE, opt)
    }

    pub fn subscribe(&self) -> ::grpcio::Result<(::grpcio::ClientDuplexSender<super::gnmi::SubscribeRequest>, ::grpcio::ClientDuplexReceiver<super::gnmi::SubscribeResponse>)> {
        self.subscribe_opt(::grpcio::CallOption::default())
    }

    pub fn spawn<F>(&self, f: F) where F: ::futures::Future<Output = ()> + Send + 'static {
        self.client.spawn(f)
    }
}
