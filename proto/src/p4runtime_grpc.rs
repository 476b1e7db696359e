// Client stubs for p4.v1.P4Runtime, kept in the style emitted by the grpc
// codegen so they can be diffed against regenerated output.

#![allow(dead_code)]
#![allow(missing_docs)]
#![allow(clippy::all)]

const METHOD_P4_RUNTIME_WRITE: ::grpcio::Method<
    super::p4runtime::WriteRequest,
    super::p4runtime::WriteResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Unary,
    name: "/p4.v1.P4Runtime/Write",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

const METHOD_P4_RUNTIME_READ: ::grpcio::Method<
    super::p4runtime::ReadRequest,
    super::p4runtime::ReadResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::ServerStreaming,
    name: "/p4.v1.P4Runtime/Read",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

const METHOD_P4_RUNTIME_SET_FORWARDING_PIPELINE_CONFIG: ::grpcio::Method<
    super::p4runtime::SetForwardingPipelineConfigRequest,
    super::p4runtime::SetForwardingPipelineConfigResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Unary,
    name: "/p4.v1.P4Runtime/SetForwardingPipelineConfig",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

const METHOD_P4_RUNTIME_GET_FORWARDING_PIPELINE_CONFIG: ::grpcio::Method<
    super::p4runtime::GetForwardingPipelineConfigRequest,
    super::p4runtime::GetForwardingPipelineConfigResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Unary,
    name: "/p4.v1.P4Runtime/GetForwardingPipelineConfig",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

const METHOD_P4_RUNTIME_STREAM_CHANNEL: ::grpcio::Method<
    super::p4runtime::StreamMessageRequest,
    super::p4runtime::StreamMessageResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Duplex,
    name: "/p4.v1.P4Runtime/StreamChannel",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

const METHOD_P4_RUNTIME_CAPABILITIES: ::grpcio::Method<
    super::p4runtime::CapabilitiesRequest,
    super::p4runtime::CapabilitiesResponse,
> = ::grpcio::Method {
    ty: ::grpcio::MethodType::Unary,
    name: "/p4.v1.P4Runtime/Capabilities",
    req_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
    resp_mar: ::grpcio::Marshaller { ser: ::grpcio::pr_ser, de: ::grpcio::pr_de },
};

#[derive(Clone)]
pub struct P4RuntimeClient {
    client: ::grpcio::Client,
}

impl P4RuntimeClient {
    pub fn new(channel: ::grpcio::Channel) -> Self {
        P4RuntimeClient {
            client: ::grpcio::Client::new(channel),
        }
    }

    pub fn write_opt(&self, req: &super::p4runtime::WriteRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::p4runtime::WriteResponse> {
        self.client.unary_call(&METHOD_P4_RUNTIME_WRITE, req, opt)
    }

    pub fn write(&self, req: &super::p4runtime::WriteRequest) -> ::grpcio::Result<super::p4runtime::WriteResponse> {
        self.write_opt(req, ::grpcio::CallOption::default())
    }

    pub fn write_async_opt(&self, req: &super::p4runtime::WriteRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::WriteResponse>> {
        self.client.unary_call_async(&METHOD_P4_RUNTIME_WRITE, req, opt)
    }

    pub fn write_async(&self, req: &super::p4runtime::WriteRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::WriteResponse>> {
        self.write_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn read_opt(&self, req: &super::p4runtime::ReadRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientSStreamReceiver<super::p4runtime::ReadResponse>> {
        self.client.server_streaming(&METHOD_P4_RUNTIME_READ, req, opt)
    }

    pub fn read(&self, req: &super::p4runtime::ReadRequest) -> ::grpcio::Result<::grpcio::ClientSStreamReceiver<super::p4runtime::ReadResponse>> {
        self.read_opt(req, ::grpcio::CallOption::default())
    }

    pub fn set_forwarding_pipeline_config_opt(&self, req: &super::p4runtime::SetForwardingPipelineConfigRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::p4runtime::SetForwardingPipelineConfigResponse> {
        self.client.unary_call(&METHOD_P4_RUNTIME_SET_FORWARDING_PIPELINE_CONFIG, req, opt)
    }

    pub fn set_forwarding_pipeline_config(&self, req: &super::p4runtime::SetForwardingPipelineConfigRequest) -> ::grpcio::Result<super::p4runtime::SetForwardingPipelineConfigResponse> {
        self.set_forwarding_pipeline_config_opt(req, ::grpcio::CallOption::default())
    }

    pub fn set_forwarding_pipeline_config_async_opt(&self, req: &super::p4runtime::SetForwardingPipelineConfigRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::SetForwardingPipelineConfigResponse>> {
        self.client.unary_call_async(&METHOD_P4_RUNTIME_SET_FORWARDING_PIPELINE_CONFIG, req, opt)
    }

    pub fn set_forwarding_pipeline_config_async(&self, req: &super::p4runtime::SetForwardingPipelineConfigRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::SetForwardingPipelineConfigResponse>> {
        self.set_forwarding_pipeline_config_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn get_forwarding_pipeline_config_opt(&self, req: &super::p4runtime::GetForwardingPipelineConfigRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::p4runtime::GetForwardingPipelineConfigResponse> {
        self.client.unary_call(&METHOD_P4_RUNTIME_GET_FORWARDING_PIPELINE_CONFIG, req, opt)
    }

    pub fn get_forwarding_pipeline_config(&self, req: &super::p4runtime::GetForwardingPipelineConfigRequest) -> ::grpcio::Result<super::p4runtime::GetForwardingPipelineConfigResponse> {
        self.get_forwarding_pipeline_config_opt(req, ::grpcio::CallOption::default())
    }

    pub fn get_forwarding_pipeline_config_async_opt(&self, req: &super::p4runtime::GetForwardingPipelineConfigRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::GetForwardingPipelineConfigResponse>> {
        self.client.unary_call_async(&METHOD_P4_RUNTIME_GET_FORWARDING_PIPELINE_CONFIG, req, opt)
    }

    pub fn get_forwarding_pipeline_config_async(&self, req: &super::p4runtime::GetForwardingPipelineConfigRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::GetForwardingPipelineConfigResponse>> {
        self.get_forwarding_pipeline_config_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn stream_channel_opt(&self, opt: ::grpcio::CallOption) -> ::grpcio::Result<(::grpcio::ClientDuplexSender<super::p4runtime::StreamMessageRequest>, ::grpcio::ClientDuplexReceiver<super::p4runtime::StreamMessageResponse>)> {
        self.client.duplex_streaming(&METHOD_P4_RUNTIME_STREAM_CHANNEL, opt)
    }

    pub fn stream_channel(&self) -> ::grpcio::Result<(::grpcio::ClientDuplexSender<super::p4runtime::StreamMessageRequest>, ::grpcio::ClientDuplexReceiver<super::p4runtime::StreamMessageResponse>)> {
        self.stream_channel_opt(::grpcio::CallOption::default())
    }

    pub fn capabilities_opt(&self, req: &super::p4runtime::CapabilitiesRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<super::p4runtime::CapabilitiesResponse> {
        self.client.unary_call(&METHOD_P4_RUNTIME_CAPABILITIES, req, opt)
    }

    pub fn capabilities(&self, req: &super::p4runtime::CapabilitiesRequest) -> ::grpcio::Result<super::p4runtime::CapabilitiesResponse> {
        self.capabilities_opt(req, ::grpcio::CallOption::default())
    }

    pub fn capabilities_async_opt(&self, req: &super::p4runtime::CapabilitiesRequest, opt: ::grpcio::CallOption) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::CapabilitiesResponse>> {
        self.client.unary_call_async(&METHOD_P4_RUNTIME_CAPABILITIES, req, opt)
    }

    pub fn capabilities_async(&self, req: &super::p4runtime::CapabilitiesRequest) -> ::grpcio::Result<::grpcio::ClientUnaryReceiver<super::p4runtime::CapabilitiesResponse>> {
        self.capabilities_async_opt(req, ::grpcio::CallOption::default())
    }

    pub fn spawn<F>(&self, f: F) where F: ::futures::Future<Output = ()> + Send + 'static {
        self.client.spawn(f)
    }
}
