//! Event kinds that stages are made of

/// Hook point in a pipeline script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum PipelineEvent {
    // Startup
    OnInitializing,
    OnCreatePhysicalQueues,
    OnStartInboxProcessing,
    OnStartControlInboxProcessing,
    OnStartOutboxProcessing,
    OnStartDeferredQueueProcessing,
    OnStarted,

    // Send
    OnAssembleMessage,
    OnFindRouteForMessage,
    OnEncryptMessage,
    OnCompressMessage,
    OnDispatchTransportMessage,

    // Send transport
    OnSerializeTransportMessage,
    OnSendMessage,
    OnAfterSendMessage,

    // Receive
    OnStartTransactionScope,
    OnDequeue,
    OnDeserializeTransportMessage,
    OnDecompressMessage,
    OnDecryptMessage,
    OnDeserializeMessage,
    OnMessageReceived,
    OnHandleMessage,
    OnMessageHandled,
    OnCompleteTransactionScope,
    OnDisposeTransactionScope,
    OnAcknowledgeMessage,

    // Deferred
    OnProcessDeferredMessage,

    // Distribute
    OnWaitForAvailableWorker,
    OnHandleDistributeMessage,
}
